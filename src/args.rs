// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use url::Url;

use crate::{
  labels::ClassNameTable,
  locate::LCD_SCORE_THRESHOLD,
  model::{DetectorConfig, DetectorError, DetectorWrapper},
  pipeline::OcrPipeline,
  record::DirectoryRecord,
};

/// LCD 读数识别服务参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 监听地址
  #[arg(long, default_value = "0.0.0.0:10080", value_name = "ADDR")]
  pub listen: SocketAddr,

  #[command(flatten)]
  pub models: ModelArgs,

  /// 上传文件暂存目录
  #[arg(long, default_value = "_pics", value_name = "DIR")]
  pub upload_dir: PathBuf,

  /// 上传大小上限（字节）
  #[arg(long, default_value_t = 16 * 1024 * 1024, value_name = "BYTES")]
  pub max_upload_bytes: usize,
}

/// 模型与识别参数，服务与单次识别共用
#[derive(clap::Args, Debug, Clone)]
pub struct ModelArgs {
  /// LCD 检测模型
  /// 支持格式:
  /// - 回放记录: fixture:///path/to/lcd.json
  /// - RKNN 模型: rknn:///path/to/lcd.rknn（需启用 rknpu_backend）
  #[arg(long, value_name = "MODEL")]
  pub lcd_model: Url,

  /// 字形检测模型，格式同上
  #[arg(long, value_name = "MODEL")]
  pub glyph_model: Url,

  /// LCD 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = LCD_SCORE_THRESHOLD, value_name = "THRESHOLD")]
  pub lcd_threshold: f32,

  /// 保存裁剪结果与字形检测记录的目录
  #[arg(long, value_name = "DIR")]
  pub record: Option<PathBuf>,
}

impl ModelArgs {
  /// 加载两个检测模型并组装识别流程
  pub fn build_pipeline(
    &self,
  ) -> Result<OcrPipeline<DetectorWrapper, DetectorWrapper>, DetectorError> {
    let lcd = DetectorWrapper::build(&self.lcd_model, DetectorConfig::lcd())?;
    let glyph = DetectorWrapper::build(&self.glyph_model, DetectorConfig::glyph())?;
    let record = self
      .record
      .as_ref()
      .map(|dir| DirectoryRecord::new(dir, ClassNameTable::glyph()));

    Ok(
      OcrPipeline::new(lcd, glyph)
        .with_threshold(self.lcd_threshold)
        .with_record(record),
    )
  }
}
