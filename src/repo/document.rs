// 该文件是 Jishu （计数） 项目的一部分。
// src/repo/document.rs - MongoDB 计数存储
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

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mongodb::{
  IndexModel,
  bson::{Bson, Document, doc},
  error::{Error as MongoError, ErrorKind, WriteFailure},
  options::IndexOptions,
  sync::{Client, Collection},
};
use tracing::{debug, info, warn};

use crate::{
  count::ObjectCount,
  repo::{
    CountRepository, DocumentTarget, RepoError, requested_classes, to_i64, to_u64,
    validate_deltas,
  },
};

const DUPLICATE_KEY: i32 = 11000;

/// 每次调用都新建客户端；计数通过服务端 `$inc` 累加
pub struct DocumentRepo {
  target: DocumentTarget,
  timeout: Duration,
  index_ready: AtomicBool,
}

fn map_mongo(err: MongoError) -> RepoError {
  match *err.kind {
    ErrorKind::Write(_) | ErrorKind::InvalidArgument { .. } | ErrorKind::BsonSerialization(_) => {
      RepoError::Constraint(err.to_string())
    }
    _ => RepoError::Connectivity(err.to_string()),
  }
}

fn is_duplicate_key(err: &MongoError) -> bool {
  matches!(
    err.kind.as_ref(),
    ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
  )
}

fn count_from_bson(value: Option<&Bson>, class: &str) -> Result<u64, RepoError> {
  match value {
    Some(Bson::Int32(v)) => to_u64(i64::from(*v), class),
    Some(Bson::Int64(v)) => to_u64(*v, class),
    Some(Bson::Double(v)) if v.fract() == 0.0 && *v >= 0.0 => Ok(*v as u64),
    other => Err(RepoError::Constraint(format!(
      "类别 '{class}' 的计数字段无效: {other:?}"
    ))),
  }
}

impl DocumentRepo {
  pub fn new(target: DocumentTarget, timeout: Duration) -> Self {
    Self {
      target,
      timeout,
      index_ready: AtomicBool::new(false),
    }
  }

  pub fn connection_uri(&self) -> String {
    let credentials = match &self.target.username {
      Some(username) => format!(
        "{}:{}@",
        urlencoding::encode(username),
        urlencoding::encode(self.target.password.as_deref().unwrap_or_default())
      ),
      None => String::new(),
    };
    let millis = self.timeout.as_millis();
    format!(
      "mongodb://{credentials}{}:{}/?appName=jishu&serverSelectionTimeoutMS={millis}&connectTimeoutMS={millis}",
      self.target.host, self.target.port
    )
  }

  fn collection(&self) -> Result<Collection<Document>, RepoError> {
    let client = Client::with_uri_str(self.connection_uri()).map_err(map_mongo)?;
    let collection = client
      .database(&self.target.database)
      .collection::<Document>(&self.target.collection);

    // 唯一索引保证并发 upsert 不会为同一类别创建两条记录
    if !self.index_ready.load(Ordering::Acquire) {
      let index = IndexModel::builder()
        .keys(doc! { "object_class": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build();
      collection.create_index(index).run().map_err(map_mongo)?;
      self.index_ready.store(true, Ordering::Release);
      info!(
        "已确认唯一索引 {}.{}(object_class)",
        self.target.database, self.target.collection
      );
    }

    Ok(collection)
  }
}

impl CountRepository for DocumentRepo {
  fn read_values(&self, classes: Option<&[String]>) -> Result<Vec<ObjectCount>, RepoError> {
    let filter = match classes {
      None => doc! {},
      Some(classes) => {
        let requested: Vec<&str> = requested_classes(classes).into_iter().collect();
        if requested.is_empty() {
          return Ok(Vec::new());
        }
        doc! { "object_class": { "$in": requested } }
      }
    };

    let collection = self.collection()?;
    let cursor = collection.find(filter).run().map_err(map_mongo)?;

    let mut counts = Vec::new();
    for document in cursor {
      let document = document.map_err(map_mongo)?;
      let object_class = document
        .get_str("object_class")
        .map_err(|e| RepoError::Constraint(format!("文档缺少 object_class: {e}")))?
        .to_string();
      let count = count_from_bson(document.get("count"), &object_class)?;
      counts.push(ObjectCount::new(object_class, count));
    }
    Ok(counts)
  }

  fn update_values(&self, deltas: &[ObjectCount]) -> Result<(), RepoError> {
    validate_deltas(deltas)?;
    if deltas.is_empty() {
      return Ok(());
    }

    let increments = deltas
      .iter()
      .map(|delta| Ok((delta.object_class.as_str(), to_i64(delta.count)?)))
      .collect::<Result<Vec<_>, RepoError>>()?;

    let collection = self.collection()?;
    for (object_class, count) in increments {
      let filter = doc! { "object_class": object_class };
      let update = doc! { "$inc": { "count": count } };
      match collection
        .update_one(filter.clone(), update.clone())
        .upsert(true)
        .run()
      {
        Ok(_) => {}
        // 两个请求同时插入同一类别时，落败的一方改为普通累加
        Err(err) if is_duplicate_key(&err) => {
          warn!("类别 '{object_class}' upsert 冲突，重试累加");
          collection
            .update_one(filter, update)
            .run()
            .map_err(map_mongo)?;
        }
        Err(err) => return Err(map_mongo(err)),
      }
    }

    debug!(
      "文档存储 {}.{} 合并 {} 个增量",
      self.target.database,
      self.target.collection,
      deltas.len()
    );
    Ok(())
  }
}
