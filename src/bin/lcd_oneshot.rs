// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/lcd_oneshot.rs - 单张图像识别
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use shanan_lcd::args::ModelArgs;

/// 对本地图像运行一次识别流程并输出 JSON 结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub models: ModelArgs,

  /// 待识别的图像文件，可指定多个
  #[arg(required = true, value_name = "IMAGE")]
  pub images: Vec<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("LCD 模型: {}", args.models.lcd_model);
  info!("字形模型: {}", args.models.glyph_model);

  let pipeline = args.models.build_pipeline()?;

  let now = std::time::Instant::now();
  for image in &args.images {
    info!("图像: {}", image.display());
    let reading = pipeline.run(image)?;
    println!("{}", serde_json::to_string(&reading)?);
  }
  info!(
    "共 {} 张图像, 平均耗时: {:.2?}",
    args.images.len(),
    now.elapsed() / args.images.len() as u32
  );

  Ok(())
}
