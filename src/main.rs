// 该文件是 Shanan （山南西风） 项目的一部分。
// src/main.rs - LCD 读数识别服务
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

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shanan_lcd::{
  args::Args,
  server::{self, AppState},
  worker::InferenceWorker,
};

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("LCD 模型: {}", args.models.lcd_model);
  info!("字形模型: {}", args.models.glyph_model);
  info!("LCD 置信度阈值: {}", args.models.lcd_threshold);
  info!("上传目录: {}", args.upload_dir.display());

  info!("正在加载模型...");
  let models = args.models.clone();
  let worker = InferenceWorker::spawn(move || models.build_pipeline())
    .context("无法启动推理线程")?;
  info!("模型加载完成");
  let worker = Arc::new(worker);

  let runtime = tokio::runtime::Runtime::new().context("无法创建异步运行时")?;
  runtime.block_on(async {
    let listener = tokio::net::TcpListener::bind(args.listen)
      .await
      .with_context(|| format!("无法监听地址: {}", args.listen))?;
    let app = server::router(
      AppState::new(worker.clone(), args.upload_dir.clone()),
      args.max_upload_bytes,
    );
    server::serve(listener, app).await.context("服务异常退出")
  })?;

  match Arc::try_unwrap(worker) {
    Ok(worker) => worker.shutdown(),
    Err(_) => info!("推理线程仍被占用，随进程退出"),
  }
  info!("服务已停止");

  Ok(())
}
