// 该文件是 Shanan （山南西风） 项目的一部分。
// src/locate.rs - LCD 区域定位
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
use serde::Serialize;
use tracing::{debug, info};

use crate::{
  labels::ClassNameTable,
  model::{Detection, Detector},
};

/// 默认 LCD 置信度阈值（严格大于）
pub const LCD_SCORE_THRESHOLD: f32 = 0.666;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Point {
  pub x: i64,
  pub y: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LcdBox {
  pub top_left: Point,
  pub bottom_right: Point,
}

impl From<&Detection> for LcdBox {
  fn from(detection: &Detection) -> Self {
    let [y1, x1, y2, x2] = detection.bbox;
    Self {
      top_left: Point {
        x: x1 as i64,
        y: y1 as i64,
      },
      bottom_right: Point {
        x: x2 as i64,
        y: y2 as i64,
      },
    }
  }
}

/// LCD 定位结果
///
/// 得分最高的候选框总会写入 `bbox`，即使未超过阈值；
/// 只有 `present` 为真时 `bbox` 才可信。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LcdRegion {
  pub bbox: Option<LcdBox>,
  pub present: bool,
  pub score: Option<f32>,
}

impl LcdRegion {
  pub fn absent() -> Self {
    Self {
      bbox: None,
      present: false,
      score: None,
    }
  }
}

pub fn locate<D: Detector>(
  detector: &D,
  image: &RgbImage,
  threshold: f32,
) -> Result<LcdRegion, D::Error> {
  let result = detector.detect(image)?;
  debug!("LCD 候选数量: {}", result.len());

  let Some(best) = result.best() else {
    info!("未检测到 LCD 候选区域");
    return Ok(LcdRegion::absent());
  };

  // 可能检测到多个 LCD，只取得分最高的一个
  let region = LcdRegion {
    bbox: Some(LcdBox::from(best)),
    present: best.score > threshold,
    score: Some(best.score),
  };

  let label = ClassNameTable::lcd().label(best.class_id).unwrap_or("?");
  if region.present {
    info!("检测到 {}, 得分 {:.3}", label, best.score);
  } else {
    info!("{} 得分 {:.3} 未超过阈值 {:.3}", label, best.score, threshold);
  }

  Ok(region)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{DetectorConfig, FixtureDetector};

  fn lcd_detector(items: Vec<Detection>) -> FixtureDetector {
    FixtureDetector::new(DetectorConfig::lcd(), items).unwrap()
  }

  fn lcd(bbox: [f32; 4], score: f32) -> Detection {
    Detection {
      bbox,
      class_id: 1,
      score,
    }
  }

  #[test]
  fn no_candidates_means_absent() {
    let region = locate(&lcd_detector(vec![]), &RgbImage::new(8, 8), LCD_SCORE_THRESHOLD).unwrap();
    assert_eq!(region, LcdRegion::absent());
  }

  #[test]
  fn picks_highest_scoring_candidate() {
    let detector = lcd_detector(vec![
      lcd([0.0, 0.0, 5.0, 5.0], 0.7),
      lcd([10.9, 20.2, 40.7, 80.5], 0.95),
    ]);
    let region = locate(&detector, &RgbImage::new(8, 8), LCD_SCORE_THRESHOLD).unwrap();
    assert!(region.present);
    assert_eq!(
      region.bbox,
      Some(LcdBox {
        top_left: Point { x: 20, y: 10 },
        bottom_right: Point { x: 80, y: 40 },
      })
    );
  }

  #[test]
  fn below_threshold_still_reports_box() {
    let detector = lcd_detector(vec![lcd([1.0, 2.0, 3.0, 4.0], 0.5)]);
    let region = locate(&detector, &RgbImage::new(8, 8), LCD_SCORE_THRESHOLD).unwrap();
    assert!(!region.present);
    assert!(region.bbox.is_some());
    assert_eq!(region.score, Some(0.5));
  }

  #[test]
  fn threshold_is_strict() {
    let detector = lcd_detector(vec![lcd([1.0, 2.0, 3.0, 4.0], 0.666)]);
    let region = locate(&detector, &RgbImage::new(8, 8), 0.666).unwrap();
    assert!(!region.present);
  }
}
