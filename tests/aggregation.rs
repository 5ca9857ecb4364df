// 该文件是 Jishu （计数） 项目的一部分。
// tests/aggregation.rs - 检测到存储的完整流程
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
use std::sync::{Arc, Mutex};
use std::thread;
#[cfg(feature = "relational_store")]
use std::time::Duration;

use jishu::{
  action::{CountDetectedObjects, ErrorKind},
  count::ObjectCount,
  detect::{BoundingBox, DetectError, Detector, FakeDetector, Prediction, RecordDetector},
  repo::{CountRepository, InMemoryRepo, RepoError},
};
#[cfg(feature = "relational_store")]
use jishu::repo::RelationalRepo;

fn prediction(class_name: &str, score: f32) -> Prediction {
  Prediction::new(
    class_name,
    BoundingBox::new(0.1, 0.2, 0.3, 0.4).unwrap(),
    score,
  )
  .unwrap()
}

/// 记录每次 update_values 收到的批次
#[derive(Default)]
struct RecordingRepo {
  inner: InMemoryRepo,
  batches: Mutex<Vec<Vec<ObjectCount>>>,
}

impl CountRepository for RecordingRepo {
  fn read_values(&self, classes: Option<&[String]>) -> Result<Vec<ObjectCount>, RepoError> {
    self.inner.read_values(classes)
  }

  fn update_values(&self, deltas: &[ObjectCount]) -> Result<(), RepoError> {
    self.batches.lock().unwrap().push(deltas.to_vec());
    self.inner.update_values(deltas)
  }
}

struct UnavailableDetector;

impl Detector for UnavailableDetector {
  fn detect(&self, _image: &[u8], _threshold: f32) -> Result<Vec<Prediction>, DetectError> {
    Err(DetectError::Unavailable("检测服务无响应".to_string()))
  }
}

struct DisconnectedRepo;

impl CountRepository for DisconnectedRepo {
  fn read_values(&self, _classes: Option<&[String]>) -> Result<Vec<ObjectCount>, RepoError> {
    Err(RepoError::Connectivity("连接被拒绝".to_string()))
  }

  fn update_values(&self, _deltas: &[ObjectCount]) -> Result<(), RepoError> {
    Err(RepoError::Connectivity("连接被拒绝".to_string()))
  }
}

#[test]
fn predictions_are_tallied_into_one_batch() {
  let detector = FakeDetector::with_predictions(vec![
    prediction("cat", 0.9),
    prediction("cat", 0.8),
    prediction("dog", 0.7),
  ]);
  let action = CountDetectedObjects::new(detector, RecordingRepo::default());

  let totals = action.execute(b"image", 0.5).unwrap();

  assert_eq!(
    totals,
    BTreeMap::from([("cat".to_string(), 2), ("dog".to_string(), 1)])
  );
  assert_eq!(
    *action.repository().batches.lock().unwrap(),
    vec![vec![ObjectCount::new("cat", 2), ObjectCount::new("dog", 1)]]
  );
}

#[test]
fn totals_are_cumulative_but_limited_to_classes_seen() {
  let repo = InMemoryRepo::default();
  repo
    .update_values(&[ObjectCount::new("cat", 10), ObjectCount::new("bird", 3)])
    .unwrap();
  let action = CountDetectedObjects::new(
    FakeDetector::with_predictions(vec![prediction("cat", 0.9)]),
    repo,
  );

  let totals = action.execute(b"image", 0.5).unwrap();
  assert_eq!(totals, BTreeMap::from([("cat".to_string(), 11)]));
}

#[test]
fn nothing_detected_writes_nothing() {
  let detector = FakeDetector::with_predictions(vec![prediction("cat", 0.3)]);
  let action = CountDetectedObjects::new(detector, RecordingRepo::default());

  assert!(action.execute(b"image", 0.5).unwrap().is_empty());
  assert!(action.repository().batches.lock().unwrap().is_empty());
}

#[test]
fn detection_failure_leaves_storage_untouched() {
  let repo = RecordingRepo::default();
  repo.inner.update_values(&[ObjectCount::new("cat", 5)]).unwrap();
  let action = CountDetectedObjects::new(UnavailableDetector, repo);

  let err = action.execute(b"image", 0.5).unwrap_err();

  assert_eq!(err.kind(), ErrorKind::DetectionFailure);
  assert!(action.repository().batches.lock().unwrap().is_empty());
  assert_eq!(
    action.repository().read_values(None).unwrap(),
    vec![ObjectCount::new("cat", 5)]
  );
}

#[test]
fn repository_failure_propagates_unchanged() {
  let action = CountDetectedObjects::new(FakeDetector::default(), DisconnectedRepo);
  let err = action.execute(b"image", 0.5).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::ConnectivityError);
}

#[test]
fn invalid_threshold_never_reaches_collaborators() {
  let action = CountDetectedObjects::new(UnavailableDetector, DisconnectedRepo);
  let err = action.execute(b"image", 2.0).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[cfg(feature = "relational_store")]
#[test]
fn replayed_records_accumulate_in_sqlite() {
  let dir = tempfile::tempdir().unwrap();
  let record = dir.path().join("record.txt");
  std::fs::write(
    &record,
    "person, 0.9100, 0.1000, 0.1000, 0.4000, 0.9000\n\
     person, 0.4200, 0.5000, 0.1000, 0.8000, 0.9000\n\
     bicycle, 0.8800, 0.2000, 0.5000, 0.7000, 0.9500\n",
  )
  .unwrap();

  let repo = RelationalRepo::open(&dir.path().join("counts.db"), Duration::from_secs(5)).unwrap();
  let action = CountDetectedObjects::new(RecordDetector::new(&record), repo);

  action.execute(b"frame-1", 0.5).unwrap();
  let totals = action.execute(b"frame-2", 0.4).unwrap();

  assert_eq!(
    totals,
    BTreeMap::from([("bicycle".to_string(), 2), ("person".to_string(), 3)])
  );
}

#[test]
fn malformed_record_is_a_detection_failure() {
  let dir = tempfile::tempdir().unwrap();
  let record = dir.path().join("record.txt");
  std::fs::write(&record, "person, 0.9, 0.5, 0.1, 0.2, 0.9\n").unwrap();

  let action = CountDetectedObjects::new(RecordDetector::new(&record), InMemoryRepo::default());
  let err = action.execute(b"frame", 0.5).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::DetectionFailure);
  assert!(action.repository().read_values(None).unwrap().is_empty());
}

#[test]
fn shared_action_counts_every_request() {
  let action = Arc::new(CountDetectedObjects::new(
    FakeDetector::with_predictions(vec![prediction("x", 1.0)]),
    InMemoryRepo::default(),
  ));

  let handles: Vec<_> = (0..16)
    .map(|_| {
      let action = Arc::clone(&action);
      thread::spawn(move || {
        action.execute(b"image", 0.5).unwrap();
      })
    })
    .collect();
  for handle in handles {
    handle.join().unwrap();
  }

  assert_eq!(
    action.repository().read_values(None).unwrap(),
    vec![ObjectCount::new("x", 16)]
  );
}
