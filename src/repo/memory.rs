// 该文件是 Jishu （计数） 项目的一部分。
// src/repo/memory.rs - 进程内计数存储
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
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::{
  count::ObjectCount,
  repo::{CountRepository, RepoError, requested_classes, validate_deltas},
};

/// 进程重启后数据丢失
#[derive(Debug, Default)]
pub struct InMemoryRepo {
  store: Mutex<BTreeMap<String, u64>>,
}

impl InMemoryRepo {
  fn store(&self) -> MutexGuard<'_, BTreeMap<String, u64>> {
    // 每次写入都在锁内完成整批计算后才修改，中毒时数据仍然一致
    match self.store.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    }
  }
}

impl CountRepository for InMemoryRepo {
  fn read_values(&self, classes: Option<&[String]>) -> Result<Vec<ObjectCount>, RepoError> {
    let store = self.store();
    let counts = match classes {
      None => store
        .iter()
        .map(|(class, count)| ObjectCount::new(class.clone(), *count))
        .collect(),
      Some(classes) => requested_classes(classes)
        .into_iter()
        .filter_map(|class| {
          store
            .get(class)
            .map(|count| ObjectCount::new(class, *count))
        })
        .collect(),
    };
    Ok(counts)
  }

  fn update_values(&self, deltas: &[ObjectCount]) -> Result<(), RepoError> {
    validate_deltas(deltas)?;

    let mut store = self.store();

    let mut merged: BTreeMap<&str, u64> = BTreeMap::new();
    for delta in deltas {
      let current = match merged.get(delta.object_class.as_str()) {
        Some(count) => *count,
        None => store.get(&delta.object_class).copied().unwrap_or(0),
      };
      let next = current.checked_add(delta.count).ok_or_else(|| {
        RepoError::Constraint(format!("类别 '{}' 的计数溢出", delta.object_class))
      })?;
      merged.insert(delta.object_class.as_str(), next);
    }

    for (class, count) in merged {
      store.insert(class.to_string(), count);
    }
    debug!("内存存储合并 {} 个增量", deltas.len());

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn batch_with_repeated_class_adds_up() {
    let repo = InMemoryRepo::default();
    repo
      .update_values(&[ObjectCount::new("cat", 3), ObjectCount::new("cat", 2)])
      .unwrap();
    assert_eq!(
      repo.read_values(None).unwrap(),
      vec![ObjectCount::new("cat", 5)]
    );
  }

  #[test]
  fn overflow_rejects_whole_batch() {
    let repo = InMemoryRepo::default();
    repo.update_values(&[ObjectCount::new("cat", u64::MAX)]).unwrap();

    let result = repo.update_values(&[ObjectCount::new("dog", 1), ObjectCount::new("cat", 1)]);
    assert!(matches!(result, Err(RepoError::Constraint(_))));
    assert_eq!(
      repo.read_values(None).unwrap(),
      vec![ObjectCount::new("cat", u64::MAX)]
    );
  }

  #[test]
  fn duplicate_requested_classes_yield_one_entry() {
    let repo = InMemoryRepo::default();
    repo.update_values(&[ObjectCount::new("cat", 1)]).unwrap();
    let classes = vec!["cat".to_string(), "cat".to_string(), "owl".to_string()];
    assert_eq!(
      repo.read_values(Some(classes.as_slice())).unwrap(),
      vec![ObjectCount::new("cat", 1)]
    );
  }
}
