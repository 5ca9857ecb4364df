// 该文件是 Jishu （计数） 项目的一部分。
// src/config.rs - 启动配置与组件装配
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

use clap::{Args, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::{
  FromUrl,
  action::{CountDetectedObjects, DEFAULT_THRESHOLD},
  detect::{DetectError, Detector, DetectorWrapper},
  repo::{DEFAULT_MONGO_PORT, DocumentTarget, RepoError, RepositoryWrapper, StoreConfig},
};

/// 日志写到 stderr，stdout 只输出计数结果
pub fn init_logging() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Profile {
  /// 进程内存储
  Dev,
  /// 使用 MONGO_* 环境变量指定的 MongoDB
  Prod,
}

/// 计数存储参数
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
  /// 计数存储 URL
  /// 支持格式:
  /// - memory://
  /// - mongodb://[user:pass@]host[:port]/database?collection=counter
  /// - sqlite:///path/to/counts.db
  /// 未指定时按 --profile 选择
  #[arg(long, env = "COUNTER_STORE", value_name = "URL")]
  pub store: Option<Url>,

  /// 运行环境
  #[arg(long, env = "ENV", value_enum, default_value = "dev")]
  pub profile: Profile,

  /// MongoDB 主机（prod 环境且未指定 --store 时使用）
  #[arg(long, env = "MONGO_HOST", default_value = "localhost")]
  pub mongo_host: String,

  /// MongoDB 端口
  #[arg(long, env = "MONGO_PORT", default_value_t = DEFAULT_MONGO_PORT)]
  pub mongo_port: u16,

  /// MongoDB 数据库名
  #[arg(long, env = "MONGO_DB", default_value = "prod_counter")]
  pub mongo_db: String,
}

impl StoreArgs {
  pub fn store_config(&self) -> Result<StoreConfig, RepoError> {
    match (&self.store, self.profile) {
      (Some(url), _) => StoreConfig::from_url(url),
      (None, Profile::Dev) => Ok(StoreConfig::memory()),
      (None, Profile::Prod) => Ok(StoreConfig::document(DocumentTarget::new(
        self.mongo_host.clone(),
        self.mongo_port,
        self.mongo_db.clone(),
      ))),
    }
  }

  pub fn open_repository(&self) -> Result<RepositoryWrapper, RepoError> {
    RepositoryWrapper::open(&self.store_config()?)
  }
}

/// 检测器参数
#[derive(Args, Debug, Clone)]
pub struct DetectorArgs {
  /// 检测器 URL
  /// 支持格式:
  /// - fake://
  /// - record:///path/to/record.txt
  #[arg(long, env = "COUNTER_DETECTOR", default_value = "fake://", value_name = "URL")]
  pub detector: Url,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, env = "COUNTER_THRESHOLD", default_value_t = DEFAULT_THRESHOLD, value_name = "THRESHOLD")]
  pub threshold: f32,

  /// 调试输出目录，例如 folder:///tmp/debug
  #[cfg(feature = "debug_render")]
  #[arg(long, env = "COUNTER_DEBUG_OUTPUT", value_name = "URL")]
  pub debug_output: Option<Url>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
  #[error("检测器配置错误: {0}")]
  Detector(#[from] DetectError),
  #[error("存储配置错误: {0}")]
  Repository(#[from] RepoError),
  #[cfg(feature = "debug_render")]
  #[error("调试输出配置错误: {0}")]
  DebugOutput(#[from] crate::output::DirectoryRecordOutputError),
}

impl DetectorArgs {
  pub fn build_detector(&self) -> Result<Box<dyn Detector>, ConfigError> {
    let detector = DetectorWrapper::from_url(&self.detector)?;

    #[cfg(feature = "debug_render")]
    if let Some(url) = &self.debug_output {
      use crate::output::{DirectoryRecordOutput, RenderedDetector};

      info!("调试输出: {}", url);
      let output = DirectoryRecordOutput::from_url(url)?;
      return Ok(Box::new(RenderedDetector::new(detector, output)));
    }

    Ok(Box::new(detector))
  }
}

pub type CountAction = CountDetectedObjects<Box<dyn Detector>, RepositoryWrapper>;

/// 按配置装配唯一的检测器和存储实例
pub fn build_action(
  store: &StoreArgs,
  detector: &DetectorArgs,
) -> Result<CountAction, ConfigError> {
  info!("检测器: {}", detector.detector);
  let detector = detector.build_detector()?;
  let repository = store.open_repository()?;
  Ok(CountDetectedObjects::new(detector, repository))
}
