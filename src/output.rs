// 该文件是 Jishu （计数） 项目的一部分。
// src/output.rs - 调试输出定义
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Jishu 项目贡献者

use std::fmt::Display;

use tracing::warn;

use crate::detect::{DetectError, Detector, Prediction};

pub trait Render<Frame: ?Sized, Output: ?Sized>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

pub mod draw;

mod directory_record;
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

/// 在检测之后把结果交给调试输出；输出失败只记录日志，不影响检测结果
pub struct RenderedDetector<D, O> {
  detector: D,
  output: O,
}

impl<D, O> RenderedDetector<D, O> {
  pub fn new(detector: D, output: O) -> Self {
    Self { detector, output }
  }
}

impl<D, O> Detector for RenderedDetector<D, O>
where
  D: Detector,
  O: Render<[u8], [Prediction]> + Send + Sync,
  O::Error: Display,
{
  fn detect(&self, image: &[u8], threshold: f32) -> Result<Vec<Prediction>, DetectError> {
    let predictions = self.detector.detect(image, threshold)?;
    if let Err(err) = self.output.render_result(image, predictions.as_slice()) {
      warn!("调试输出失败: {err}");
    }
    Ok(predictions)
  }
}
