// 该文件是 Shanan （山南西风） 项目的一部分。
// src/crop.rs - LCD 区域裁剪
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
use thiserror::Error;
use tracing::{debug, warn};

use crate::locate::LcdBox;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CropError {
  #[error("裁剪区域为空: ({x1}, {y1}) - ({x2}, {y2})，图像 {width}x{height}")]
  EmptyRegion {
    x1: i64,
    y1: i64,
    x2: i64,
    y2: i64,
    width: u32,
    height: u32,
  },
}

/// 裁剪 `image[y1:y2, x1:x2]`（左闭右开），超出图像的部分截断到图像边界
pub fn crop_region(image: &RgbImage, region: &LcdBox) -> Result<RgbImage, CropError> {
  let (width, height) = image.dimensions();

  let x1 = region.top_left.x.clamp(0, width as i64);
  let y1 = region.top_left.y.clamp(0, height as i64);
  let x2 = region.bottom_right.x.clamp(0, width as i64);
  let y2 = region.bottom_right.y.clamp(0, height as i64);

  if (x1, y1, x2, y2)
    != (
      region.top_left.x,
      region.top_left.y,
      region.bottom_right.x,
      region.bottom_right.y,
    )
  {
    warn!(
      "LCD 区域超出图像 {}x{}, 已截断为 ({}, {}) - ({}, {})",
      width, height, x1, y1, x2, y2
    );
  }

  if x2 <= x1 || y2 <= y1 {
    return Err(CropError::EmptyRegion {
      x1,
      y1,
      x2,
      y2,
      width,
      height,
    });
  }

  let (w, h) = ((x2 - x1) as u32, (y2 - y1) as u32);
  debug!("裁剪 LCD 区域: ({}, {}) {}x{}", x1, y1, w, h);
  Ok(image::imageops::crop_imm(image, x1 as u32, y1 as u32, w, h).to_image())
}
