// 该文件是 Jishu （计数） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{Datelike, Utc};
use image::ImageFormat;
use thiserror::Error;
use tracing::info;

use crate::{
  FromUrl, FromUrlWithScheme, decoded_path,
  detect::{Prediction, format_record_line},
  output::{Render, draw::Draw},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按日期分目录保存画框后的图像，并在旁边写一份同名的 `.txt` 记录
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Draw,
  frame_counter: Mutex<u16>,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    Ok(Self::new(decoded_path(uri)))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      draw: Draw::default(),
      frame_counter: Mutex::new(0),
    }
  }

  fn frame_id(&self) -> u16 {
    let mut counter = match self.frame_counter.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    *counter = counter.wrapping_add(1);
    *counter
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.jpg",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<[u8], [Prediction]> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &[u8], result: &[Prediction]) -> Result<(), Self::Error> {
    let mut image = image::load_from_memory(frame)?.to_rgb8();
    self.draw.draw_predictions(&mut image, result);

    let path = self.frame_path()?;
    image.save_with_format(&path, ImageFormat::Jpeg)?;

    let records: Vec<String> = result.iter().map(format_record_line).collect();
    std::fs::write(path.with_extension("txt"), records.join("\n"))?;

    info!("调试图像已保存: {}", path.display());
    Ok(())
  }
}
