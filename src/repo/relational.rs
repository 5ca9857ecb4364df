// 该文件是 Jishu （计数） 项目的一部分。
// src/repo/relational.rs - SQLite 计数存储
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

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior, params, params_from_iter};
use tracing::{debug, info, warn};

use crate::{
  count::ObjectCount,
  repo::{CountRepository, RepoError, requested_classes, to_i64, to_u64, validate_deltas},
};

const CURRENT_SCHEMA_VERSION: i32 = 2;

const UPSERT_SQL: &str = "INSERT INTO object_counts (object_class, count) VALUES (?1, ?2)
   ON CONFLICT(object_class) DO UPDATE SET count = count + excluded.count";

/// 单个长连接；写入使用 IMMEDIATE 事务，多进程共享同一文件时也不会丢失增量
pub struct RelationalRepo {
  conn: Mutex<Connection>,
  path: PathBuf,
}

fn map_sqlite(err: rusqlite::Error) -> RepoError {
  match err.sqlite_error_code() {
    Some(
      ErrorCode::DatabaseBusy
      | ErrorCode::DatabaseLocked
      | ErrorCode::CannotOpen
      | ErrorCode::SystemIoFailure
      | ErrorCode::DiskFull
      | ErrorCode::NotADatabase
      | ErrorCode::DatabaseCorrupt
      | ErrorCode::PermissionDenied
      | ErrorCode::ReadOnly
      | ErrorCode::FileLockingProtocolFailed,
    ) => RepoError::Connectivity(err.to_string()),
    _ => RepoError::Constraint(err.to_string()),
  }
}

fn run_migrations(conn: &mut Connection) -> Result<(), RepoError> {
  let mut version: i32 = conn
    .pragma_query_value(None, "user_version", |row| row.get(0))
    .map_err(map_sqlite)?;

  if version > CURRENT_SCHEMA_VERSION {
    return Err(RepoError::Constraint(format!(
      "数据库版本 ({version}) 高于支持的表结构版本 ({CURRENT_SCHEMA_VERSION})"
    )));
  }

  if version == CURRENT_SCHEMA_VERSION {
    return Ok(());
  }

  let tx = conn
    .transaction_with_behavior(TransactionBehavior::Immediate)
    .map_err(map_sqlite)?;

  while version < CURRENT_SCHEMA_VERSION {
    let next_version = version + 1;
    apply_migration(&tx, next_version).map_err(|e| match e {
      RepoError::Connectivity(msg) => RepoError::Connectivity(msg),
      other => RepoError::Constraint(format!("迁移到版本 {next_version} 失败: {other}")),
    })?;
    version = next_version;
  }

  tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
    .map_err(map_sqlite)?;
  tx.commit().map_err(map_sqlite)?;

  info!("表结构已迁移到版本 {}", CURRENT_SCHEMA_VERSION);
  Ok(())
}

fn apply_migration(tx: &Transaction<'_>, version: i32) -> Result<(), RepoError> {
  match version {
    1 => tx
      .execute_batch(include_str!("schemas/schema_v1.sql"))
      .map_err(map_sqlite),
    2 => tx
      .execute_batch(include_str!("schemas/schema_v2.sql"))
      .map_err(map_sqlite),
    _ => Err(RepoError::Constraint(format!("未知的迁移目标版本: {version}"))),
  }
}

impl RelationalRepo {
  pub fn open(path: &Path, timeout: Duration) -> Result<Self, RepoError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent).map_err(|e| {
        RepoError::Connectivity(format!("无法创建目录 {}: {e}", parent.display()))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      RepoError::Connectivity(format!("无法打开数据库 {}: {e}", path.display()))
    })?;

    if let Err(err) =
      conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
    {
      warn!("无法启用 WAL 模式: {err}");
    }

    Self::with_connection(conn, path.to_path_buf(), timeout)
  }

  /// 不落盘的 SQLite 数据库，主要用于测试
  pub fn open_in_memory() -> Result<Self, RepoError> {
    let conn = Connection::open_in_memory().map_err(map_sqlite)?;
    Self::with_connection(conn, PathBuf::from(":memory:"), Duration::from_secs(1))
  }

  fn with_connection(
    mut conn: Connection,
    path: PathBuf,
    timeout: Duration,
  ) -> Result<Self, RepoError> {
    conn.busy_timeout(timeout).map_err(map_sqlite)?;
    run_migrations(&mut conn)?;

    info!("SQLite 计数存储已就绪: {}", path.display());
    Ok(Self {
      conn: Mutex::new(conn),
      path,
    })
  }

  pub fn path(&self) -> &Path {
    self.path.as_path()
  }

  fn conn(&self) -> MutexGuard<'_, Connection> {
    // 事务在 panic 时随 Transaction 析构回滚，连接本身仍可用
    match self.conn.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    }
  }
}

fn collect_counts(
  stmt: &mut rusqlite::Statement<'_>,
  params: impl rusqlite::Params,
) -> Result<Vec<ObjectCount>, RepoError> {
  let mut rows = stmt.query(params).map_err(map_sqlite)?;
  let mut counts = Vec::new();
  while let Some(row) = rows.next().map_err(map_sqlite)? {
    let object_class: String = row.get(0).map_err(map_sqlite)?;
    let count: i64 = row.get(1).map_err(map_sqlite)?;
    let count = to_u64(count, &object_class)?;
    counts.push(ObjectCount::new(object_class, count));
  }
  Ok(counts)
}

impl CountRepository for RelationalRepo {
  fn read_values(&self, classes: Option<&[String]>) -> Result<Vec<ObjectCount>, RepoError> {
    let conn = self.conn();
    match classes {
      None => {
        let mut stmt = conn
          .prepare_cached("SELECT object_class, count FROM object_counts ORDER BY object_class")
          .map_err(map_sqlite)?;
        collect_counts(&mut stmt, [])
      }
      Some(classes) => {
        let requested = requested_classes(classes);
        if requested.is_empty() {
          return Ok(Vec::new());
        }
        let placeholders = vec!["?"; requested.len()].join(", ");
        let query = format!(
          "SELECT object_class, count FROM object_counts
           WHERE object_class IN ({placeholders})
           ORDER BY object_class"
        );
        let mut stmt = conn.prepare(&query).map_err(map_sqlite)?;
        collect_counts(&mut stmt, params_from_iter(requested))
      }
    }
  }

  fn update_values(&self, deltas: &[ObjectCount]) -> Result<(), RepoError> {
    validate_deltas(deltas)?;
    if deltas.is_empty() {
      return Ok(());
    }

    let mut conn = self.conn();
    let tx = conn
      .transaction_with_behavior(TransactionBehavior::Immediate)
      .map_err(map_sqlite)?;
    {
      let mut stmt = tx.prepare_cached(UPSERT_SQL).map_err(map_sqlite)?;
      for delta in deltas {
        stmt
          .execute(params![delta.object_class, to_i64(delta.count)?])
          .map_err(map_sqlite)?;
      }
    }
    tx.commit().map_err(map_sqlite)?;

    debug!("SQLite 存储合并 {} 个增量", deltas.len());
    Ok(())
  }
}
