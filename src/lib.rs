// 该文件是 Jishu （计数） 项目的一部分。
// src/lib.rs - 库主文件
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

pub mod action;
pub mod config;
pub mod count;
pub mod detect;
#[cfg(feature = "debug_render")]
pub mod output;
pub mod repo;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 从 URL 查询参数中读取超时（毫秒）
pub(crate) fn timeout_from_query(
  url: &url::Url,
  default: std::time::Duration,
) -> Result<std::time::Duration, std::num::ParseIntError> {
  for (k, v) in url.query_pairs() {
    if k == "timeout_ms" {
      return v.parse::<u64>().map(std::time::Duration::from_millis);
    }
  }
  Ok(default)
}

/// URL 路径中可能带有百分号编码（例如空格）
pub(crate) fn decoded_path(url: &url::Url) -> String {
  urlencoding::decode(url.path())
    .map(|p| p.into_owned())
    .unwrap_or_else(|_| url.path().to_string())
}
