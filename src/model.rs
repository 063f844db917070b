// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 检测器适配层
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

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

/// 预训练检测模型的统一接口
///
/// 推理本身（候选框、NMS、掩码解码）由后端负责，这里只约定输入与输出。
pub trait Detector {
  type Error: std::error::Error + Send + Sync + 'static;

  fn config(&self) -> &DetectorConfig;
  fn detect(&self, image: &RgbImage) -> Result<DetectResult, Self::Error>;
}

/// 单个检测结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub bbox: [f32; 4], // [y1, x1, y2, x2]，像素坐标
  pub class_id: u32,
  pub score: f32,
}

impl Detection {
  /// 边界框的水平中心
  pub fn center_x(&self) -> f32 {
    (self.bbox[1] + self.bbox[3]) / 2.0
  }
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  /// 得分最高的检测结果，分数相同时取最靠前的一个
  ///
  /// 得分为 NaN 的结果不参与比较。
  pub fn best(&self) -> Option<&Detection> {
    let mut best: Option<&Detection> = None;
    for item in self.items.iter().filter(|item| !item.score.is_nan()) {
      match best {
        Some(current) if item.score <= current.score => {}
        _ => best = Some(item),
      }
    }
    best
  }
}

impl DetectResult {
  /// 由模型的归一化输出还原检测结果
  ///
  /// `boxes` 每 4 个值为一个 `[y1, x1, y2, x2]`，相对边长 `input_side` 的输入；
  /// 再除以 `scale` 还原到原图像素。类别 ID 四舍五入，背景类别 0 被丢弃。
  pub fn from_normalized(
    boxes: &[f32],
    class_ids: &[f32],
    scores: &[f32],
    input_side: u32,
    scale: f32,
  ) -> Self {
    let to_source = |v: f32| v * input_side as f32 / scale;
    boxes
      .chunks_exact(4)
      .zip(class_ids.iter().zip(scores.iter()))
      .filter(|(_, (class_id, _))| class_id.round() >= 1.0)
      .map(|(bbox, (class_id, score))| Detection {
        bbox: [
          to_source(bbox[0]),
          to_source(bbox[1]),
          to_source(bbox[2]),
          to_source(bbox[3]),
        ],
        class_id: class_id.round() as u32,
        score: *score,
      })
      .collect::<Vec<_>>()
      .into()
  }
}

impl From<Vec<Detection>> for DetectResult {
  fn from(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

/// 检测模型配置，与训练时保持一致
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
  pub name: &'static str,
  /// 类别数量（包含背景）
  pub num_classes: usize,
  pub image_min_dim: u32,
  pub image_max_dim: u32,
  /// 锚框边长（像素）
  pub anchor_scales: [u32; 5],
  pub gpu_count: u32,
  pub images_per_gpu: u32,
}

impl DetectorConfig {
  /// LCD 区域模型：背景 + LCD
  pub const fn lcd() -> Self {
    Self {
      name: "LCD",
      num_classes: 2,
      image_min_dim: 800,
      image_max_dim: 1024,
      anchor_scales: [32, 64, 128, 256, 512],
      gpu_count: 1,
      images_per_gpu: 1,
    }
  }

  /// 字形模型：背景 + 35 类字形
  pub const fn glyph() -> Self {
    Self {
      name: "NUM",
      num_classes: 1 + 35,
      image_min_dim: 512,
      image_max_dim: 512,
      anchor_scales: [8 * 6, 16 * 6, 32 * 6, 64 * 6, 128 * 6],
      gpu_count: 1,
      images_per_gpu: 1,
    }
  }

  pub fn batch_size(&self) -> u32 {
    self.gpu_count * self.images_per_gpu
  }

  /// 输入缩放比例
  ///
  /// 短边至少放大到 `image_min_dim`，但长边不超过 `image_max_dim`，之后补齐为
  /// `image_max_dim` 的正方形。
  pub fn resize_scale(&self, width: u32, height: u32) -> f32 {
    let short = width.min(height).max(1) as f32;
    let long = width.max(height).max(1) as f32;
    let mut scale = (self.image_min_dim as f32 / short).max(1.0);
    if long * scale > self.image_max_dim as f32 {
      scale = self.image_max_dim as f32 / long;
    }
    scale
  }
}

mod fixture;
pub use self::fixture::{FixtureDetector, FixtureDetectorBuilder, FixtureDetectorError};

#[cfg(feature = "rknpu_backend")]
mod rknn;
#[cfg(feature = "rknpu_backend")]
pub use self::rknn::{RknnDetector, RknnDetectorBuilder, RknnDetectorError};

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("回放检测器错误: {0}")]
  Fixture(#[from] FixtureDetectorError),
  #[cfg(feature = "rknpu_backend")]
  #[error("RKNN 检测器错误: {0}")]
  Rknn(#[from] RknnDetectorError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum DetectorWrapper {
  Fixture(FixtureDetector),
  #[cfg(feature = "rknpu_backend")]
  Rknn(RknnDetector),
}

impl DetectorWrapper {
  /// 根据 URL 方案选择后端并加载模型
  pub fn build(url: &Url, config: DetectorConfig) -> Result<Self, DetectorError> {
    #[cfg(feature = "rknpu_backend")]
    {
      if url.scheme() == RknnDetectorBuilder::SCHEME {
        let detector = RknnDetectorBuilder::from_url(url)?.config(config).build()?;
        return Ok(DetectorWrapper::Rknn(detector));
      }
    }

    if url.scheme() == FixtureDetectorBuilder::SCHEME {
      let detector = FixtureDetectorBuilder::from_url(url)?
        .config(config)
        .build()?;
      return Ok(DetectorWrapper::Fixture(detector));
    }

    Err(DetectorError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl Detector for DetectorWrapper {
  type Error = DetectorError;

  fn config(&self) -> &DetectorConfig {
    match self {
      DetectorWrapper::Fixture(detector) => detector.config(),
      #[cfg(feature = "rknpu_backend")]
      DetectorWrapper::Rknn(detector) => detector.config(),
    }
  }

  fn detect(&self, image: &RgbImage) -> Result<DetectResult, Self::Error> {
    match self {
      DetectorWrapper::Fixture(detector) => detector.detect(image).map_err(DetectorError::from),
      #[cfg(feature = "rknpu_backend")]
      DetectorWrapper::Rknn(detector) => detector.detect(image).map_err(DetectorError::from),
    }
  }
}
