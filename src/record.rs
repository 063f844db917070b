// 该文件是 Shanan （山南西风） 项目的一部分。
// src/record.rs - 识别过程记录
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

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{Datelike, Utc};
use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use thiserror::Error;
use tracing::info;

use crate::{
  labels::{ClassNameTable, TokenBucket},
  model::DetectResult,
};

const OTHER_COLOR: [u8; 3] = [0, 0, 255];
const DIGIT_COLOR: [u8; 3] = [0, 255, 0];
const UNIT_COLOR: [u8; 3] = [255, 0, 255];

#[derive(Error, Debug)]
pub enum RecordError {
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 将裁剪后的 LCD 图像与字形检测结果按日期目录保存
pub struct DirectoryRecord {
  directory: PathBuf,
  table: ClassNameTable,
  counter: AtomicU16,
}

impl DirectoryRecord {
  pub fn new(directory: impl Into<PathBuf>, table: ClassNameTable) -> Self {
    Self {
      directory: directory.into(),
      table,
      counter: AtomicU16::new(0),
    }
  }

  fn frame_path(&self) -> Result<PathBuf, RecordError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    let id = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
    Ok(directory.join(format!("{}-{:04X}.png", now.format("%H-%M-%S"), id)))
  }

  /// 返回保存的图像路径，旁边附带同名 `.txt` 检测记录
  pub fn save(&self, crop: &RgbImage, result: &DetectResult) -> Result<PathBuf, RecordError> {
    let path = self.frame_path()?;

    let mut image = crop.clone();
    for item in result.items.iter() {
      let label = self.table.label(item.class_id).unwrap_or("?");
      let color = match TokenBucket::classify(label) {
        TokenBucket::Other => OTHER_COLOR,
        TokenBucket::Digit => DIGIT_COLOR,
        TokenBucket::Unit => UNIT_COLOR,
      };
      let [y1, x1, y2, x2] = item.bbox;
      let (w, h) = ((x2 - x1).round() as i64, (y2 - y1).round() as i64);
      if w > 0 && h > 0 {
        let rect = Rect::at(x1 as i32, y1 as i32).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(&mut image, rect, Rgb(color));
      }
    }
    image.save(&path)?;
    self.write_sidecar(&path, result)?;

    info!("识别记录已保存: {}", path.display());
    Ok(path)
  }

  fn write_sidecar(&self, path: &Path, result: &DetectResult) -> Result<(), RecordError> {
    let records: Vec<String> = result
      .items
      .iter()
      .map(|item| {
        format!(
          "{}, {:.4}, {:.1}, {:.1}, {:.1}, {:.1}",
          self.table.label(item.class_id).unwrap_or("?"),
          item.score,
          item.bbox[0],
          item.bbox[1],
          item.bbox[2],
          item.bbox[3]
        )
      })
      .collect();
    std::fs::write(path.with_extension("txt"), records.join("\n"))?;
    Ok(())
  }
}
