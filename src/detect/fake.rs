// 该文件是 Jishu （计数） 项目的一部分。
// src/detect/fake.rs - 开发用固定检测器
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

use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detect::{BoundingBox, DetectError, Detector, Prediction},
};

/// 无论输入什么图像，都返回同一组预测
#[derive(Debug, Clone)]
pub struct FakeDetector {
  predictions: Vec<Prediction>,
}

impl Default for FakeDetector {
  fn default() -> Self {
    let fixed = [
      ("cat", 0.999_190_7, [0.367_288_86, 0.278_333_43, 0.735_821_4, 0.698_885_5]),
      ("cat", 0.998_045_2, [0.092_317_83, 0.129_877_36, 0.562_904_3, 0.711_617_7]),
      ("dog", 0.519_246_7, [0.014_326_38, 0.224_211_56, 0.443_179_6, 0.882_604_3]),
    ];

    let predictions = fixed
      .into_iter()
      .map(|(class_name, score, [xmin, ymin, xmax, ymax])| Prediction {
        class_name: class_name.to_string(),
        bbox: BoundingBox {
          xmin,
          ymin,
          xmax,
          ymax,
        },
        score,
      })
      .collect();

    Self { predictions }
  }
}

impl FakeDetector {
  pub fn with_predictions(predictions: Vec<Prediction>) -> Self {
    Self { predictions }
  }
}

impl FromUrlWithScheme for FakeDetector {
  const SCHEME: &'static str = "fake";
}

impl FromUrl for FakeDetector {
  type Error = DetectError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DetectError::SchemeMismatch(format!(
        "期望方案 '{}', 实际方案 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }
    Ok(Self::default())
  }
}

impl Detector for FakeDetector {
  fn detect(&self, image: &[u8], threshold: f32) -> Result<Vec<Prediction>, DetectError> {
    debug!("固定检测器收到 {} 字节图像", image.len());
    Ok(
      self
        .predictions
        .iter()
        .filter(|p| p.score >= threshold)
        .cloned()
        .collect(),
    )
  }
}
