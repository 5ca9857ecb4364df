// 该文件是 Jishu （计数） 项目的一部分。
// src/main.rs - 项目主程序
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

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use jishu::config::{DetectorArgs, StoreArgs, build_action, init_logging};

/// 统计图像中检测到的目标，并累计到计数存储
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub store: StoreArgs,

  #[command(flatten)]
  pub detector: DetectorArgs,

  /// 输入图像文件
  #[arg(value_name = "IMAGE", required = true)]
  pub images: Vec<PathBuf>,
}

fn main() -> Result<()> {
  init_logging();

  let args = Args::parse();

  let action = build_action(&args.store, &args.detector)?;

  for path in &args.images {
    let image = std::fs::read(path).with_context(|| format!("无法读取图像 {}", path.display()))?;
    info!("处理图像: {} ({} 字节)", path.display(), image.len());

    let now = std::time::Instant::now();
    let totals = action
      .execute(&image, args.detector.threshold)
      .with_context(|| format!("处理图像 {} 失败", path.display()))?;
    info!("处理完成，耗时: {:.2?}", now.elapsed());

    println!("{}", serde_json::to_string(&totals)?);
  }

  Ok(())
}
