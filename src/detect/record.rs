// 该文件是 Jishu （计数） 项目的一部分。
// src/detect/record.rs - 回放记录文件中的检测结果
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

use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decoded_path,
  detect::{BoundingBox, DetectError, Detector, Prediction},
};

/// 每行一条记录：`class, score, xmin, ymin, xmax, ymax`
///
/// 每次检测都重新读取文件，记录文件可以在运行期间被替换。
#[derive(Debug, Clone)]
pub struct RecordDetector {
  path: PathBuf,
}

impl RecordDetector {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

impl FromUrlWithScheme for RecordDetector {
  const SCHEME: &'static str = "record";
}

impl FromUrl for RecordDetector {
  type Error = DetectError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(DetectError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(Self::new(decoded_path(url)))
  }
}

/// 数值按最短的无损形式写出，读回后与原值完全相同
pub fn format_record_line(prediction: &Prediction) -> String {
  let [xmin, ymin, xmax, ymax] = prediction.bbox.as_array();
  format!(
    "{}, {}, {}, {}, {}, {}",
    prediction.class_name, prediction.score, xmin, ymin, xmax, ymax
  )
}

/// 从右侧切分，类别名中可以包含逗号
pub fn parse_record_line(line: &str) -> Result<Prediction, DetectError> {
  let fields: Vec<&str> = line.rsplitn(6, ',').map(str::trim).collect();
  let &[ymax, xmax, ymin, xmin, score, class_name] = fields.as_slice() else {
    return Err(DetectError::Malformed(format!(
      "记录需要 6 个字段, 实际 {} 个: '{line}'",
      fields.len()
    )));
  };
  if class_name.is_empty() {
    return Err(DetectError::Malformed(format!("类别名为空: '{line}'")));
  }

  let number = |raw: &str| {
    raw
      .parse::<f32>()
      .map_err(|e| DetectError::Malformed(format!("无法解析数值 '{raw}': {e}")))
  };

  let bbox = BoundingBox::new(number(xmin)?, number(ymin)?, number(xmax)?, number(ymax)?)?;
  Prediction::new(class_name, bbox, number(score)?)
}

impl Detector for RecordDetector {
  fn detect(&self, image: &[u8], threshold: f32) -> Result<Vec<Prediction>, DetectError> {
    let content = std::fs::read_to_string(&self.path).map_err(|e| {
      DetectError::Unavailable(format!("无法读取记录文件 {}: {e}", self.path.display()))
    })?;
    debug!(
      "回放记录 {} ({} 字节图像)",
      self.path.display(),
      image.len()
    );

    let mut predictions = Vec::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
      let prediction = parse_record_line(line)?;
      if prediction.score >= threshold {
        predictions.push(prediction);
      }
    }
    Ok(predictions)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_a_record_line() {
    let p = parse_record_line("dog, 0.7500, 0.1000, 0.2000, 0.3000, 0.4000").unwrap();
    assert_eq!(p.class_name, "dog");
    assert_eq!(p.score, 0.75);
    assert_eq!(p.bbox.as_array(), [0.1, 0.2, 0.3, 0.4]);
  }

  #[test]
  fn formatted_line_parses_back() {
    let p = parse_record_line("traffic light, 0.5, 0.0, 0.0, 1.0, 1.0").unwrap();
    assert_eq!(
      format_record_line(&p),
      "traffic light, 0.5, 0, 0, 1, 1"
    );
  }

  #[test]
  fn narrow_box_survives_a_round_trip() {
    let p = Prediction::new(
      "wire",
      BoundingBox::new(0.10001, 0.2, 0.10004, 0.3).unwrap(),
      0.123456,
    )
    .unwrap();
    assert_eq!(parse_record_line(&format_record_line(&p)).unwrap(), p);
  }

  #[test]
  fn class_name_may_contain_commas() {
    let p = Prediction::new(
      "salt, pepper",
      BoundingBox::new(0.1, 0.2, 0.3, 0.4).unwrap(),
      0.9,
    )
    .unwrap();
    let line = format_record_line(&p);
    assert_eq!(line, "salt, pepper, 0.9, 0.1, 0.2, 0.3, 0.4");
    assert_eq!(parse_record_line(&line).unwrap(), p);
  }

  #[test]
  fn rejects_short_and_garbled_lines() {
    assert!(matches!(
      parse_record_line("cat, 0.9"),
      Err(DetectError::Malformed(_))
    ));
    assert!(matches!(
      parse_record_line("cat, high, 0, 0, 1, 1"),
      Err(DetectError::Malformed(_))
    ));
    assert!(matches!(
      parse_record_line(", 0.9, 0, 0, 1, 1"),
      Err(DetectError::Malformed(_))
    ));
  }

  #[test]
  fn missing_file_is_unavailable() {
    let detector = RecordDetector::new("/nonexistent/jishu/record.txt");
    assert!(matches!(
      detector.detect(b"img", 0.5),
      Err(DetectError::Unavailable(_))
    ));
  }
}
