// 该文件是 Jishu （计数） 项目的一部分。
// src/count.rs - 计数数据模型
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

use serde::{Deserialize, Serialize};

use crate::detect::Prediction;

/// 某一类别的累计计数；作为增量时表示本次请求的新增数量
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectCount {
  pub object_class: String,
  pub count: u64,
}

impl ObjectCount {
  pub fn new(object_class: impl Into<String>, count: u64) -> Self {
    Self {
      object_class: object_class.into(),
      count,
    }
  }

  pub fn is_valid(&self) -> bool {
    !self.object_class.is_empty()
  }
}

/// 将同一请求中的预测按类别合并为增量列表，按类别名排序
pub fn tally<'a, I>(predictions: I) -> Vec<ObjectCount>
where
  I: IntoIterator<Item = &'a Prediction>,
{
  let mut counter: BTreeMap<&str, u64> = BTreeMap::new();
  for prediction in predictions {
    *counter.entry(prediction.class_name.as_str()).or_default() += 1;
  }

  counter
    .into_iter()
    .map(|(class, count)| ObjectCount::new(class, count))
    .collect()
}

/// 转为可直接序列化的映射
pub fn to_mapping(counts: Vec<ObjectCount>) -> BTreeMap<String, u64> {
  counts
    .into_iter()
    .map(|ObjectCount { object_class, count }| (object_class, count))
    .collect()
}
