// 该文件是 Jishu （计数） 项目的一部分。
// src/bin/counts.rs - 查询累计计数
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

use anyhow::Result;
use clap::Parser;
use tracing::info;

use jishu::{
  config::{StoreArgs, init_logging},
  count::to_mapping,
  repo::CountRepository,
};

/// 输出计数存储中的累计值
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub store: StoreArgs,

  /// 只输出这些类别；不指定时输出全部
  #[arg(value_name = "CLASS")]
  pub classes: Vec<String>,
}

fn main() -> Result<()> {
  init_logging();

  let args = Args::parse();
  let repository = args.store.open_repository()?;

  let filter = (!args.classes.is_empty()).then_some(args.classes.as_slice());
  let counts = repository.read_values(filter)?;
  info!("读取到 {} 个类别", counts.len());

  println!("{}", serde_json::to_string(&to_mapping(counts))?);
  Ok(())
}
