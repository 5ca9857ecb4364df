// 该文件是 Jishu （计数） 项目的一部分。
// src/action.rs - 检测结果累计计数
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

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info};

use crate::{
  count::{tally, to_mapping},
  detect::{DetectError, Detector},
  repo::{CountRepository, RepoError},
};

pub const DEFAULT_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  InvalidArgument,
  DetectionFailure,
  ConnectivityError,
  ConstraintError,
}

#[derive(Error, Debug)]
pub enum CountError {
  #[error("参数无效: {0}")]
  InvalidArgument(String),
  #[error("目标检测失败: {0}")]
  DetectionFailure(#[from] DetectError),
  #[error("计数存储错误: {0}")]
  Repository(#[from] RepoError),
}

impl CountError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      CountError::InvalidArgument(_) => ErrorKind::InvalidArgument,
      CountError::DetectionFailure(_) => ErrorKind::DetectionFailure,
      CountError::Repository(RepoError::Connectivity(_)) => ErrorKind::ConnectivityError,
      CountError::Repository(RepoError::Constraint(_)) => ErrorKind::ConstraintError,
      CountError::Repository(RepoError::Config(_)) => ErrorKind::InvalidArgument,
    }
  }
}

/// 调用检测器、按类别汇总、合并写入存储，并返回最新的累计值
pub struct CountDetectedObjects<D, R> {
  detector: D,
  repository: R,
}

impl<D: Detector, R: CountRepository> CountDetectedObjects<D, R> {
  pub fn new(detector: D, repository: R) -> Self {
    Self {
      detector,
      repository,
    }
  }

  pub fn repository(&self) -> &R {
    &self.repository
  }

  pub fn execute(&self, image: &[u8], threshold: f32) -> Result<BTreeMap<String, u64>, CountError> {
    if !(0.0..=1.0).contains(&threshold) {
      return Err(CountError::InvalidArgument(format!(
        "置信度阈值必须在 [0, 1] 之间, 实际为 {threshold}"
      )));
    }
    if image.is_empty() {
      return Err(CountError::InvalidArgument("图像内容为空".to_string()));
    }

    let predictions = self.detector.detect(image, threshold)?;
    debug!("检测到 {} 个目标", predictions.len());

    let deltas = tally(&predictions);
    if deltas.is_empty() {
      return Ok(BTreeMap::new());
    }

    self.repository.update_values(&deltas)?;

    let classes: Vec<String> = deltas.into_iter().map(|d| d.object_class).collect();
    let totals = to_mapping(self.repository.read_values(Some(classes.as_slice()))?);
    info!("累计计数: {:?}", totals);

    Ok(totals)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detect::FakeDetector;
  use crate::repo::InMemoryRepo;

  #[test]
  fn threshold_is_validated_before_detection() {
    let action = CountDetectedObjects::new(FakeDetector::default(), InMemoryRepo::default());
    for threshold in [-0.1, 1.01, f32::NAN] {
      let err = action.execute(b"image", threshold).unwrap_err();
      assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
    assert!(action.repository().read_values(None).unwrap().is_empty());
  }

  #[test]
  fn empty_image_is_rejected() {
    let action = CountDetectedObjects::new(FakeDetector::default(), InMemoryRepo::default());
    let err = action.execute(b"", DEFAULT_THRESHOLD).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
  }

  #[test]
  fn counts_accumulate_across_requests() {
    let action = CountDetectedObjects::new(FakeDetector::default(), InMemoryRepo::default());

    let first = action.execute(b"image", DEFAULT_THRESHOLD).unwrap();
    assert_eq!(first, BTreeMap::from([("cat".to_string(), 2), ("dog".to_string(), 1)]));

    let second = action.execute(b"image", 0.9).unwrap();
    assert_eq!(second, BTreeMap::from([("cat".to_string(), 4)]));
  }

  #[test]
  fn error_kinds_follow_repository_errors() {
    let err = CountError::from(RepoError::Connectivity("down".into()));
    assert_eq!(err.kind(), ErrorKind::ConnectivityError);
    let err = CountError::from(RepoError::Constraint("bad".into()));
    assert_eq!(err.kind(), ErrorKind::ConstraintError);
    let err = CountError::from(DetectError::Unavailable("gone".into()));
    assert_eq!(err.kind(), ErrorKind::DetectionFailure);
  }
}
