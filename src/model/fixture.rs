// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/fixture.rs - 回放检测器
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

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectResult, Detection, Detector, DetectorConfig},
};

/// 对每张图像都返回同一组预先记录的检测结果
///
/// 记录文件为 JSON 数组：`[{"bbox": [y1, x1, y2, x2], "class_id": 1, "score": 0.9}, ...]`。
pub struct FixtureDetector {
  config: DetectorConfig,
  result: DetectResult,
}

#[derive(Error, Debug)]
pub enum FixtureDetectorError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("记录文件解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("类别 {class_id} 超出模型类别数 {num_classes}")]
  UnknownClass { class_id: u32, num_classes: usize },
  #[error("记录中出现背景类别 0")]
  BackgroundClass,
}

impl FixtureDetector {
  pub fn new(
    config: DetectorConfig,
    items: Vec<Detection>,
  ) -> Result<Self, FixtureDetectorError> {
    // 真实模型不会输出背景类别
    if items.iter().any(|item| item.class_id == 0) {
      error!("{} 模型记录中出现背景类别", config.name);
      return Err(FixtureDetectorError::BackgroundClass);
    }
    if let Some(item) = items
      .iter()
      .find(|item| item.class_id as usize >= config.num_classes)
    {
      error!(
        "{} 模型记录中出现未知类别 {}",
        config.name, item.class_id
      );
      return Err(FixtureDetectorError::UnknownClass {
        class_id: item.class_id,
        num_classes: config.num_classes,
      });
    }

    Ok(Self {
      config,
      result: DetectResult::from(items),
    })
  }
}

impl Detector for FixtureDetector {
  type Error = FixtureDetectorError;

  fn config(&self) -> &DetectorConfig {
    &self.config
  }

  fn detect(&self, image: &RgbImage) -> Result<DetectResult, Self::Error> {
    debug!(
      "{} 回放检测: 图像 {}x{}, {} 个结果",
      self.config.name,
      image.width(),
      image.height(),
      self.result.len()
    );
    Ok(self.result.clone())
  }
}

pub struct FixtureDetectorBuilder {
  path: PathBuf,
  config: DetectorConfig,
}

impl FromUrlWithScheme for FixtureDetectorBuilder {
  const SCHEME: &'static str = "fixture";
}

impl FromUrl for FixtureDetectorBuilder {
  type Error = FixtureDetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(FixtureDetectorError::SchemeMismatch(format!(
        "期望方案 '{}', 实际方案 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(FixtureDetectorBuilder {
      path: PathBuf::from(url.path()),
      config: DetectorConfig::glyph(),
    })
  }
}

impl FixtureDetectorBuilder {
  pub fn config(mut self, config: DetectorConfig) -> Self {
    self.config = config;
    self
  }

  pub fn build(self) -> Result<FixtureDetector, FixtureDetectorError> {
    info!("加载检测记录: {}", self.path.display());
    let data = std::fs::read(&self.path)?;
    let items: Vec<Detection> = serde_json::from_slice(&data)?;
    debug!("{} 模型记录了 {} 个检测结果", self.config.name, items.len());
    FixtureDetector::new(self.config, items)
  }
}
