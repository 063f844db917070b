// 该文件是 Shanan （山南西风） 项目的一部分。
// src/assemble.rs - 字形排序与分组
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

use thiserror::Error;
use tracing::debug;

use crate::{
  labels::{ClassNameTable, TokenBucket},
  model::Detection,
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AssembleError {
  #[error("类别 {class_id} 超出类别名称表范围 (共 {len} 类)")]
  IndexOutOfRange { class_id: u32, len: usize },
  #[error("背景类别 0 不能作为字形输出")]
  BackgroundClass,
}

/// 将字形检测结果整理为读数
///
/// 按边界框水平中心从左到右排序（稳定排序，中心相同时保持检测顺序），
/// 再按 `其他 ++ 数字/分隔符 ++ 单位` 拼接。多行显示屏上从左到右的顺序并不可靠。
/// 类别 0 是背景，出现即视为检测器输出错误。
pub fn assemble(
  detections: &[Detection],
  table: &ClassNameTable,
) -> Result<Vec<String>, AssembleError> {
  if detections.is_empty() {
    return Ok(Vec::new());
  }

  let mut order: Vec<usize> = (0..detections.len()).collect();
  order.sort_by(|&a, &b| {
    detections[a]
      .center_x()
      .total_cmp(&detections[b].center_x())
  });

  let mut other = Vec::new();
  let mut digits = Vec::new();
  let mut units = Vec::new();

  for index in order {
    let class_id = detections[index].class_id;
    if class_id == 0 {
      return Err(AssembleError::BackgroundClass);
    }
    let label = table.label(class_id).ok_or(AssembleError::IndexOutOfRange {
      class_id,
      len: table.len(),
    })?;

    match TokenBucket::classify(label) {
      TokenBucket::Other => other.push(label.to_string()),
      TokenBucket::Digit => digits.push(label.to_string()),
      TokenBucket::Unit => units.push(label.to_string()),
    }
  }

  debug!(
    "字形分组: 其他 {:?}, 数字 {:?}, 单位 {:?}",
    other, digits, units
  );

  other.extend(digits);
  other.extend(units);
  Ok(other)
}
