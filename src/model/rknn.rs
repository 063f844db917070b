// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/rknn.rs - RKNN 检测器
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

use image::{RgbImage, imageops::FilterType};
use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectResult, Detector, DetectorConfig},
};

// 导出模型已包含候选框、NMS 等后处理，输出为 boxes / class_ids / scores
const RKNN_NUM_INPUTS: u32 = 1;
const RKNN_NUM_OUTPUTS: u32 = 3;
const RKNN_OUTPUT_BOXES: usize = 0;
const RKNN_OUTPUT_CLASS_IDS: usize = 1;
const RKNN_OUTPUT_SCORES: usize = 2;

pub struct RknnDetector {
  context: Context,
  config: DetectorConfig,
}

#[derive(Error, Debug)]
pub enum RknnDetectorError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("输出形状不一致: boxes={boxes}, class_ids={class_ids}, scores={scores}")]
  OutputMismatch {
    boxes: usize,
    class_ids: usize,
    scores: usize,
  },
}

pub struct RknnDetectorBuilder {
  model_path: String,
  config: DetectorConfig,
}

impl FromUrlWithScheme for RknnDetectorBuilder {
  const SCHEME: &'static str = "rknn";
}

impl FromUrl for RknnDetectorBuilder {
  type Error = RknnDetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RknnDetectorError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(RknnDetectorBuilder {
      model_path: url.path().to_string(),
      config: DetectorConfig::glyph(),
    })
  }
}

impl RknnDetectorBuilder {
  pub fn config(mut self, config: DetectorConfig) -> Self {
    self.config = config;
    self
  }

  pub fn build(self) -> Result<RknnDetector, RknnDetectorError> {
    if self.config.batch_size() != 1 {
      return Err(RknnDetectorError::ModelInvalid(format!(
        "仅支持单张推理, 当前批大小为 {}",
        self.config.batch_size()
      )));
    }

    info!("加载 {} 模型文件: {}", self.config.name, self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, InitFlags::default())?;

    let num_inputs = context.num_inputs()?;
    let num_outputs = context.num_outputs()?;

    if num_inputs != RKNN_NUM_INPUTS || num_outputs != RKNN_NUM_OUTPUTS {
      error!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        RKNN_NUM_INPUTS, RKNN_NUM_OUTPUTS, num_inputs, num_outputs
      );
      return Err(RknnDetectorError::ModelInvalid(format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        RKNN_NUM_INPUTS, RKNN_NUM_OUTPUTS, num_inputs, num_outputs
      )));
    }

    debug!(
      "{} 模型: {} 类, 输入边长 {}-{}, 锚框 {:?}",
      self.config.name,
      self.config.num_classes,
      self.config.image_min_dim,
      self.config.image_max_dim,
      self.config.anchor_scales
    );
    info!("{} 模型加载完成", self.config.name);

    Ok(RknnDetector {
      context,
      config: self.config,
    })
  }
}

impl Detector for RknnDetector {
  type Error = RknnDetectorError;

  fn config(&self) -> &DetectorConfig {
    &self.config
  }

  fn detect(&self, image: &RgbImage) -> Result<DetectResult, Self::Error> {
    let side = self.config.image_max_dim;
    let scale = self.config.resize_scale(image.width(), image.height());
    let width = ((image.width() as f32 * scale).round() as u32).clamp(1, side);
    let height = ((image.height() as f32 * scale).round() as u32).clamp(1, side);

    debug!(
      "缩放输入图像 {}x{} -> {}x{}, 补齐到 {}x{}",
      image.width(),
      image.height(),
      width,
      height,
      side,
      side
    );
    let resized = image::imageops::resize(image, width, height, FilterType::Triangle);
    // 右侧与下方补零
    let mut input = RgbImage::new(side, side);
    image::imageops::replace(&mut input, &resized, 0, 0);

    self
      .context
      .set_input(0, input.as_raw(), TensorFormat::NHWC, TensorType::UInt8)?;

    debug!("执行模型推理");
    self.context.run()?;

    let output = self.context.get_outputs()?;
    let boxes = output.get_f32(RKNN_OUTPUT_BOXES)?;
    let class_ids = output.get_f32(RKNN_OUTPUT_CLASS_IDS)?;
    let scores = output.get_f32(RKNN_OUTPUT_SCORES)?;

    if boxes.len() != scores.len() * 4 || class_ids.len() != scores.len() {
      return Err(RknnDetectorError::OutputMismatch {
        boxes: boxes.len(),
        class_ids: class_ids.len(),
        scores: scores.len(),
      });
    }

    let result = DetectResult::from_normalized(&boxes, &class_ids, &scores, side, scale);
    debug!("{} 模型检测到 {} 个物体", self.config.name, result.len());
    debug!("检测结果: {:?}", result.items);

    Ok(result)
  }
}
