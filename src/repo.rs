// 该文件是 Jishu （计数） 项目的一部分。
// src/repo.rs - 计数存储接口与后端选择
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

use std::{collections::BTreeSet, fmt, path::PathBuf, time::Duration};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, count::ObjectCount, decoded_path, timeout_from_query};

mod memory;
pub use self::memory::InMemoryRepo;

#[cfg(feature = "document_store")]
mod document;
#[cfg(feature = "document_store")]
pub use self::document::DocumentRepo;

#[cfg(feature = "relational_store")]
mod relational;
#[cfg(feature = "relational_store")]
pub use self::relational::RelationalRepo;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MONGO_PORT: u16 = 27017;
pub const DEFAULT_DATABASE: &str = "counter";
pub const DEFAULT_COLLECTION: &str = "counter";

#[derive(Error, Debug)]
pub enum RepoError {
  #[error("存储后端连接失败: {0}")]
  Connectivity(String),
  #[error("记录或表结构约束冲突: {0}")]
  Constraint(String),
  #[error("存储配置错误: {0}")]
  Config(String),
}

/// 计数存储
///
/// `read_values(None)` 返回全部记录；`read_values(Some(classes))` 只返回
/// 已存在的类别，不存在的类别直接省略，重复的类别只出现一次。
///
/// `update_values` 把每个增量加到对应类别上（不存在则创建），同一批次中
/// 重复的类别累加。批次中任何一个增量无效时，整批都不会写入。
pub trait CountRepository: Send + Sync {
  fn read_values(&self, classes: Option<&[String]>) -> Result<Vec<ObjectCount>, RepoError>;
  fn update_values(&self, deltas: &[ObjectCount]) -> Result<(), RepoError>;
}

impl<R: CountRepository + ?Sized> CountRepository for Box<R> {
  fn read_values(&self, classes: Option<&[String]>) -> Result<Vec<ObjectCount>, RepoError> {
    (**self).read_values(classes)
  }

  fn update_values(&self, deltas: &[ObjectCount]) -> Result<(), RepoError> {
    (**self).update_values(deltas)
  }
}

impl<R: CountRepository + ?Sized> CountRepository for std::sync::Arc<R> {
  fn read_values(&self, classes: Option<&[String]>) -> Result<Vec<ObjectCount>, RepoError> {
    (**self).read_values(classes)
  }

  fn update_values(&self, deltas: &[ObjectCount]) -> Result<(), RepoError> {
    (**self).update_values(deltas)
  }
}

pub(crate) fn validate_deltas(deltas: &[ObjectCount]) -> Result<(), RepoError> {
  match deltas.iter().find(|d| !d.is_valid()) {
    Some(invalid) => Err(RepoError::Constraint(format!(
      "类别名不能为空 (count = {})",
      invalid.count
    ))),
    None => Ok(()),
  }
}

pub(crate) fn requested_classes(classes: &[String]) -> BTreeSet<&str> {
  classes.iter().map(String::as_str).collect()
}

pub(crate) fn to_i64(value: u64) -> Result<i64, RepoError> {
  i64::try_from(value)
    .map_err(|_| RepoError::Constraint(format!("计数 {value} 超出存储整数范围")))
}

pub(crate) fn to_u64(value: i64, class: &str) -> Result<u64, RepoError> {
  u64::try_from(value)
    .map_err(|_| RepoError::Constraint(format!("类别 '{class}' 的计数为负数: {value}")))
}

/// 文档存储的连接目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTarget {
  pub host: String,
  pub port: u16,
  pub database: String,
  pub collection: String,
  pub username: Option<String>,
  pub password: Option<String>,
}

impl DocumentTarget {
  pub fn new(host: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
    Self {
      host: host.into(),
      port,
      database: database.into(),
      collection: DEFAULT_COLLECTION.to_string(),
      username: None,
      password: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
  Memory,
  Document(DocumentTarget),
  Relational { path: PathBuf },
}

/// 启动时解析一次的存储配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
  pub kind: StoreKind,
  pub timeout: Duration,
}

impl StoreConfig {
  pub fn memory() -> Self {
    Self {
      kind: StoreKind::Memory,
      timeout: DEFAULT_TIMEOUT,
    }
  }

  pub fn document(target: DocumentTarget) -> Self {
    Self {
      kind: StoreKind::Document(target),
      timeout: DEFAULT_TIMEOUT,
    }
  }

  pub fn relational(path: impl Into<PathBuf>) -> Self {
    Self {
      kind: StoreKind::Relational { path: path.into() },
      timeout: DEFAULT_TIMEOUT,
    }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }
}

/// 日志中不输出密码
impl fmt::Display for StoreConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.kind {
      StoreKind::Memory => write!(f, "memory://"),
      StoreKind::Document(target) => {
        write!(f, "mongodb://")?;
        if let Some(username) = &target.username {
          write!(f, "{username}:***@")?;
        }
        write!(
          f,
          "{}:{}/{}?collection={}",
          target.host, target.port, target.database, target.collection
        )
      }
      StoreKind::Relational { path } => write!(f, "sqlite://{}", path.display()),
    }
  }
}

const MEMORY_SCHEME: &str = "memory";
const DOCUMENT_SCHEME: &str = "mongodb";
const RELATIONAL_SCHEME: &str = "sqlite";

impl FromUrl for StoreConfig {
  type Error = RepoError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let timeout = timeout_from_query(url, DEFAULT_TIMEOUT)
      .map_err(|e| RepoError::Config(format!("timeout_ms 无效: {e}")))?;

    let kind = match url.scheme() {
      MEMORY_SCHEME => StoreKind::Memory,
      DOCUMENT_SCHEME => {
        let host = url
          .host_str()
          .filter(|h| !h.is_empty())
          .unwrap_or("localhost")
          .to_string();
        let database = url.path().trim_matches('/');
        let mut target = DocumentTarget::new(
          host,
          url.port().unwrap_or(DEFAULT_MONGO_PORT),
          if database.is_empty() {
            DEFAULT_DATABASE
          } else {
            database
          },
        );
        if let Some((_, collection)) = url.query_pairs().find(|(k, _)| k == "collection") {
          target.collection = collection.into_owned();
        }
        if !url.username().is_empty() {
          target.username = Some(
            urlencoding::decode(url.username())
              .map_err(|e| RepoError::Config(format!("用户名编码无效: {e}")))?
              .into_owned(),
          );
          target.password = url
            .password()
            .map(urlencoding::decode)
            .transpose()
            .map_err(|e| RepoError::Config(format!("密码编码无效: {e}")))?
            .map(|p| p.into_owned());
        }
        StoreKind::Document(target)
      }
      RELATIONAL_SCHEME => {
        // sqlite://data/counts.db 中的 data 会被解析为主机名
        let path = match url.host_str().filter(|h| !h.is_empty()) {
          Some(host) => PathBuf::from(format!("{host}{}", decoded_path(url))),
          None => PathBuf::from(decoded_path(url)),
        };
        if path.as_os_str().is_empty() || path.as_os_str() == "/" {
          return Err(RepoError::Config(format!("缺少数据库文件路径: {url}")));
        }
        StoreKind::Relational { path }
      }
      other => {
        return Err(RepoError::Config(format!("不支持的存储方案 '{other}'")));
      }
    };

    Ok(StoreConfig { kind, timeout })
  }
}

pub enum RepositoryWrapper {
  Memory(InMemoryRepo),
  #[cfg(feature = "document_store")]
  Document(DocumentRepo),
  #[cfg(feature = "relational_store")]
  Relational(RelationalRepo),
}

impl RepositoryWrapper {
  pub fn open(config: &StoreConfig) -> Result<Self, RepoError> {
    info!("打开计数存储: {}", config);
    match &config.kind {
      StoreKind::Memory => Ok(RepositoryWrapper::Memory(InMemoryRepo::default())),
      #[cfg(feature = "document_store")]
      StoreKind::Document(target) => Ok(RepositoryWrapper::Document(DocumentRepo::new(
        target.clone(),
        config.timeout,
      ))),
      #[cfg(not(feature = "document_store"))]
      StoreKind::Document(_) => Err(RepoError::Config(
        "未启用 document_store 特性".to_string(),
      )),
      #[cfg(feature = "relational_store")]
      StoreKind::Relational { path } => Ok(RepositoryWrapper::Relational(RelationalRepo::open(
        path,
        config.timeout,
      )?)),
      #[cfg(not(feature = "relational_store"))]
      StoreKind::Relational { .. } => Err(RepoError::Config(
        "未启用 relational_store 特性".to_string(),
      )),
    }
  }
}

impl FromUrl for RepositoryWrapper {
  type Error = RepoError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    RepositoryWrapper::open(&StoreConfig::from_url(url)?)
  }
}

impl CountRepository for RepositoryWrapper {
  fn read_values(&self, classes: Option<&[String]>) -> Result<Vec<ObjectCount>, RepoError> {
    match self {
      RepositoryWrapper::Memory(repo) => repo.read_values(classes),
      #[cfg(feature = "document_store")]
      RepositoryWrapper::Document(repo) => repo.read_values(classes),
      #[cfg(feature = "relational_store")]
      RepositoryWrapper::Relational(repo) => repo.read_values(classes),
    }
  }

  fn update_values(&self, deltas: &[ObjectCount]) -> Result<(), RepoError> {
    match self {
      RepositoryWrapper::Memory(repo) => repo.update_values(deltas),
      #[cfg(feature = "document_store")]
      RepositoryWrapper::Document(repo) => repo.update_values(deltas),
      #[cfg(feature = "relational_store")]
      RepositoryWrapper::Relational(repo) => repo.update_values(deltas),
    }
  }
}
