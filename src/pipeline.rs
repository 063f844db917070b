// 该文件是 Shanan （山南西风） 项目的一部分。
// src/pipeline.rs - 识别流程
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

use std::path::Path;
use std::time::Instant;

use image::{ImageReader, RgbImage};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  assemble::{AssembleError, assemble},
  crop::{CropError, crop_region},
  labels::ClassNameTable,
  locate::{LCD_SCORE_THRESHOLD, LcdBox, locate},
  model::Detector,
  record::{DirectoryRecord, RecordError},
};

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// 接口返回体
///
/// `NUM` 为 `null` 表示文件不可用，空数组表示没有找到 LCD。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reading {
  #[serde(rename = "NUM")]
  pub num: Option<Vec<String>>,
}

impl Reading {
  pub fn file_error() -> Self {
    Self { num: None }
  }

  pub fn no_lcd() -> Self {
    Self {
      num: Some(Vec::new()),
    }
  }

  pub fn tokens(tokens: Vec<String>) -> Self {
    Self { num: Some(tokens) }
  }
}

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("LCD 检测错误: {0}")]
  LcdDetector(#[source] BoxedError),
  #[error("字形检测错误: {0}")]
  GlyphDetector(#[source] BoxedError),
  #[error("裁剪错误: {0}")]
  CropError(#[from] CropError),
  #[error("字形整理错误: {0}")]
  AssembleError(#[from] AssembleError),
  #[error("记录错误: {0}")]
  RecordError(#[from] RecordError),
}

enum Stage {
  FileCheck,
  LocateLcd,
  Crop(RgbImage, LcdBox),
  AssembleTokens(RgbImage),
  FileError,
  NoLcd,
  Done(Vec<String>),
}

impl Stage {
  fn name(&self) -> &'static str {
    match self {
      Stage::FileCheck => "FileCheck",
      Stage::LocateLcd => "LocateLcd",
      Stage::Crop(..) => "Crop",
      Stage::AssembleTokens(_) => "AssembleTokens",
      Stage::FileError => "FileError",
      Stage::NoLcd => "NoLcd",
      Stage::Done(_) => "Done",
    }
  }
}

/// 定位 LCD、裁剪、识别字形的完整流程
///
/// 不做任何重试，检测、裁剪或整理中出现的错误直接返回给调用方。
pub struct OcrPipeline<L, G> {
  lcd: L,
  glyph: G,
  table: ClassNameTable,
  threshold: f32,
  record: Option<DirectoryRecord>,
}

impl<L: Detector, G: Detector> OcrPipeline<L, G> {
  pub fn new(lcd: L, glyph: G) -> Self {
    Self {
      lcd,
      glyph,
      table: ClassNameTable::glyph(),
      threshold: LCD_SCORE_THRESHOLD,
      record: None,
    }
  }

  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn with_record(mut self, record: Option<DirectoryRecord>) -> Self {
    self.record = record;
    self
  }

  pub fn run(&self, path: &Path) -> Result<Reading, PipelineError> {
    let mut stage = Stage::FileCheck;
    loop {
      debug!("识别阶段: {}", stage.name());
      stage = match stage {
        Stage::FileCheck => {
          if path.is_file() {
            Stage::LocateLcd
          } else {
            Stage::FileError
          }
        }
        Stage::LocateLcd => {
          let image = ImageReader::open(path)?
            .with_guessed_format()?
            .decode()?
            .to_rgb8();
          let now = Instant::now();
          let region = locate(&self.lcd, &image, self.threshold)
            .map_err(|e| PipelineError::LcdDetector(Box::new(e)))?;
          info!("LCD 判定耗时: {:.2?}", now.elapsed());

          match region.bbox {
            Some(bbox) if region.present => Stage::Crop(image, bbox),
            _ => Stage::NoLcd,
          }
        }
        Stage::Crop(image, bbox) => Stage::AssembleTokens(crop_region(&image, &bbox)?),
        Stage::AssembleTokens(crop) => {
          let now = Instant::now();
          let result = self
            .glyph
            .detect(&crop)
            .map_err(|e| PipelineError::GlyphDetector(Box::new(e)))?;
          info!(
            "字形判定耗时: {:.2?}, 检测到 {} 个字形",
            now.elapsed(),
            result.len()
          );

          if let Some(record) = &self.record {
            record.save(&crop, &result)?;
          }

          Stage::Done(assemble(&result.items, &self.table)?)
        }
        Stage::FileError => {
          error!("文件不存在: {}", path.display());
          return Ok(Reading::file_error());
        }
        Stage::NoLcd => return Ok(Reading::no_lcd()),
        Stage::Done(tokens) => {
          info!("识别结果: {:?}", tokens);
          return Ok(Reading::tokens(tokens));
        }
      };
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{DetectResult, Detection, DetectorConfig, FixtureDetector};
  use image::Rgb;

  fn lcd(score: f32) -> FixtureDetector {
    FixtureDetector::new(
      DetectorConfig::lcd(),
      vec![Detection {
        bbox: [4.0, 8.0, 20.0, 40.0],
        class_id: 1,
        score,
      }],
    )
    .unwrap()
  }

  fn glyphs(items: Vec<(u32, f32)>) -> FixtureDetector {
    let items = items
      .into_iter()
      .map(|(class_id, x)| Detection {
        bbox: [0.0, x, 10.0, x + 5.0],
        class_id,
        score: 0.9,
      })
      .collect();
    FixtureDetector::new(DetectorConfig::glyph(), items).unwrap()
  }

  fn write_image(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("scale.png");
    RgbImage::from_pixel(64, 32, Rgb([200, 200, 200]))
      .save(&path)
      .unwrap();
    path
  }

  /// 不经过记录校验，原样返回给定的检测结果
  struct StaticDetector(DetectorConfig, Vec<Detection>);

  impl Detector for StaticDetector {
    type Error = std::io::Error;

    fn config(&self) -> &DetectorConfig {
      &self.0
    }

    fn detect(&self, _image: &RgbImage) -> Result<DetectResult, Self::Error> {
      Ok(DetectResult::from(self.1.clone()))
    }
  }

  struct FailingDetector(DetectorConfig);

  impl Detector for FailingDetector {
    type Error = std::io::Error;

    fn config(&self) -> &DetectorConfig {
      &self.0
    }

    fn detect(&self, _image: &RgbImage) -> Result<DetectResult, Self::Error> {
      Err(std::io::Error::other("推理失败"))
    }
  }

  #[test]
  fn missing_file_reads_null() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = OcrPipeline::new(lcd(0.9), glyphs(vec![]));
    let reading = pipeline.run(&dir.path().join("absent.jpg")).unwrap();
    assert_eq!(reading, Reading::file_error());
    assert_eq!(serde_json::to_string(&reading).unwrap(), r#"{"NUM":null}"#);
  }

  #[test]
  fn weak_lcd_reads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path());
    let pipeline = OcrPipeline::new(lcd(0.5), glyphs(vec![(2, 0.0)]));
    let reading = pipeline.run(&path).unwrap();
    assert_eq!(serde_json::to_string(&reading).unwrap(), r#"{"NUM":[]}"#);
  }

  #[test]
  fn reads_tokens_from_lcd() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path());
    // 体重 6 5 . 2 kg
    let pipeline = OcrPipeline::new(
      lcd(0.98),
      glyphs(vec![(28, 50.0), (7, 10.0), (23, 0.0), (1, 15.0), (4, 20.0), (8, 5.0)]),
    );
    let reading = pipeline.run(&path).unwrap();
    assert_eq!(
      reading,
      Reading::tokens(
        ["体重", "6", "5", ".", "2", "kg"]
          .iter()
          .map(|s| s.to_string())
          .collect()
      )
    );
    assert_eq!(
      serde_json::to_string(&reading).unwrap(),
      r#"{"NUM":["体重","6","5",".","2","kg"]}"#
    );
  }

  #[test]
  fn lcd_without_glyphs_reads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path());
    let pipeline = OcrPipeline::new(lcd(0.9), glyphs(vec![]));
    assert_eq!(pipeline.run(&path).unwrap(), Reading::no_lcd());
  }

  #[test]
  fn detector_failure_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path());
    let pipeline = OcrPipeline::new(lcd(0.9), FailingDetector(DetectorConfig::glyph()));
    assert!(matches!(
      pipeline.run(&path),
      Err(PipelineError::GlyphDetector(_))
    ));
  }

  #[test]
  fn background_glyph_is_never_emitted() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path());
    let glyph = StaticDetector(
      DetectorConfig::glyph(),
      vec![
        Detection {
          bbox: [0.0, 0.0, 10.0, 5.0],
          class_id: 0,
          score: 0.9,
        },
        Detection {
          bbox: [0.0, 10.0, 10.0, 15.0],
          class_id: 3,
          score: 0.9,
        },
      ],
    );
    let pipeline = OcrPipeline::new(lcd(0.9), glyph);
    assert!(matches!(
      pipeline.run(&path),
      Err(PipelineError::AssembleError(AssembleError::BackgroundClass))
    ));
  }

  #[test]
  fn undecodable_image_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"not an image").unwrap();
    let pipeline = OcrPipeline::new(lcd(0.9), glyphs(vec![]));
    assert!(matches!(
      pipeline.run(&path),
      Err(PipelineError::ImageError(_))
    ));
  }

  #[test]
  fn records_crop_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(dir.path());
    let record_dir = dir.path().join("record");
    let pipeline = OcrPipeline::new(lcd(0.9), glyphs(vec![(3, 2.0)])).with_record(Some(
      DirectoryRecord::new(&record_dir, ClassNameTable::glyph()),
    ));
    pipeline.run(&path).unwrap();
    assert!(record_dir.exists());
  }
}
