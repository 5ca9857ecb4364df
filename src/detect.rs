// 该文件是 Jishu （计数） 项目的一部分。
// src/detect.rs - 目标检测能力
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

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

mod fake;
mod record;

pub use self::fake::FakeDetector;
pub use self::record::{RecordDetector, format_record_line, parse_record_line};

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("检测服务不可用: {0}")]
  Unavailable(String),
  #[error("检测结果无法解析: {0}")]
  Malformed(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 归一化边界框 [x_min, y_min, x_max, y_max]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
  pub xmin: f32,
  pub ymin: f32,
  pub xmax: f32,
  pub ymax: f32,
}

impl BoundingBox {
  pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Result<Self, DetectError> {
    let in_unit = |v: f32| (0.0..=1.0).contains(&v);
    if !(in_unit(xmin) && in_unit(ymin) && in_unit(xmax) && in_unit(ymax)) {
      return Err(DetectError::Malformed(format!(
        "边界框坐标超出 [0, 1]: ({xmin}, {ymin}, {xmax}, {ymax})"
      )));
    }
    if xmin >= xmax || ymin >= ymax {
      return Err(DetectError::Malformed(format!(
        "边界框为空: ({xmin}, {ymin}, {xmax}, {ymax})"
      )));
    }
    Ok(Self {
      xmin,
      ymin,
      xmax,
      ymax,
    })
  }

  pub fn as_array(&self) -> [f32; 4] {
    [self.xmin, self.ymin, self.xmax, self.ymax]
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
  pub class_name: String,
  pub bbox: BoundingBox,
  pub score: f32,
}

impl Prediction {
  pub fn new(
    class_name: impl Into<String>,
    bbox: BoundingBox,
    score: f32,
  ) -> Result<Self, DetectError> {
    if !(0.0..=1.0).contains(&score) {
      return Err(DetectError::Malformed(format!("置信度超出 [0, 1]: {score}")));
    }
    Ok(Self {
      class_name: class_name.into(),
      bbox,
      score,
    })
  }
}

/// 检测能力：返回置信度不低于阈值的预测
pub trait Detector: Send + Sync {
  fn detect(&self, image: &[u8], threshold: f32) -> Result<Vec<Prediction>, DetectError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
  fn detect(&self, image: &[u8], threshold: f32) -> Result<Vec<Prediction>, DetectError> {
    (**self).detect(image, threshold)
  }
}

impl<D: Detector + ?Sized> Detector for std::sync::Arc<D> {
  fn detect(&self, image: &[u8], threshold: f32) -> Result<Vec<Prediction>, DetectError> {
    (**self).detect(image, threshold)
  }
}

pub enum DetectorWrapper {
  Fake(FakeDetector),
  Record(RecordDetector),
}

impl FromUrl for DetectorWrapper {
  type Error = DetectError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      FakeDetector::SCHEME => Ok(DetectorWrapper::Fake(FakeDetector::from_url(url)?)),
      RecordDetector::SCHEME => Ok(DetectorWrapper::Record(RecordDetector::from_url(url)?)),
      other => Err(DetectError::SchemeMismatch(format!(
        "不支持的检测器方案 '{other}'"
      ))),
    }
  }
}

impl Detector for DetectorWrapper {
  fn detect(&self, image: &[u8], threshold: f32) -> Result<Vec<Prediction>, DetectError> {
    match self {
      DetectorWrapper::Fake(detector) => detector.detect(image, threshold),
      DetectorWrapper::Record(detector) => detector.detect(image, threshold),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bbox_rejects_out_of_range() {
    assert!(BoundingBox::new(-0.1, 0.0, 0.5, 0.5).is_err());
    assert!(BoundingBox::new(0.0, 0.0, 1.5, 0.5).is_err());
  }

  #[test]
  fn bbox_rejects_inverted_corners() {
    assert!(BoundingBox::new(0.6, 0.1, 0.5, 0.5).is_err());
    assert!(BoundingBox::new(0.1, 0.5, 0.5, 0.5).is_err());
  }

  #[test]
  fn prediction_rejects_bad_score() {
    let bbox = BoundingBox::new(0.1, 0.1, 0.2, 0.2).unwrap();
    assert!(Prediction::new("cat", bbox, 1.2).is_err());
    assert!(Prediction::new("cat", bbox, f32::NAN).is_err());
    assert!(Prediction::new("cat", bbox, 1.0).is_ok());
  }

  #[test]
  fn wrapper_dispatches_by_scheme() {
    let url = Url::parse("fake://").unwrap();
    assert!(matches!(
      DetectorWrapper::from_url(&url),
      Ok(DetectorWrapper::Fake(_))
    ));

    let url = Url::parse("yolo://model").unwrap();
    assert!(matches!(
      DetectorWrapper::from_url(&url),
      Err(DetectError::SchemeMismatch(_))
    ));
  }
}
