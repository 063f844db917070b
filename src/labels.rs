// 该文件是 Shanan （山南西风） 项目的一部分。
// src/labels.rs - 类别名称表与字形分组
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

/// 字形模型类别名称，下标即类别 ID，0 为背景
pub const GLYPH_CLASS_NAMES: [&str; 36] = [
  "BG",
  ".",
  "0",
  "1",
  "2",
  "3",
  "4",
  "5",
  "6",
  "7",
  "8",
  "9",
  "-",
  "%",
  "才",
  "基礎代謝量",
  "筋肉量",
  "男性",
  "女性",
  "内蔵脂肪",
  "体内年齢",
  "体脂肪率",
  "生年月日",
  "体重",
  "BMI",
  "年",
  "cm",
  "kcal/日",
  "kg",
  "レベル",
  "体年齢",
  "皮下脂肪率",
  "骨格筋率",
  "基礎代謝",
  "kcal",
  "内蔵脂肪レベル",
];

/// LCD 模型类别名称
pub const LCD_CLASS_NAMES: [&str; 2] = ["BG", "LCD"];

const SEPARATORS: [&str; 2] = [".", "-"];
const UNITS: [&str; 8] = ["%", "才", "年", "cm", "kcal/日", "kg", "レベル", "kcal"];

#[derive(Debug, Clone, Copy)]
pub struct ClassNameTable {
  names: &'static [&'static str],
}

impl ClassNameTable {
  pub const fn new(names: &'static [&'static str]) -> Self {
    Self { names }
  }

  pub const fn glyph() -> Self {
    Self::new(&GLYPH_CLASS_NAMES)
  }

  pub const fn lcd() -> Self {
    Self::new(&LCD_CLASS_NAMES)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// 类别 ID 超出表长时返回 `None`
  pub fn label(&self, class_id: u32) -> Option<&'static str> {
    self.names.get(class_id as usize).copied()
  }
}

/// 输出分组，按 `Other`、`Digit`、`Unit` 的顺序拼接
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenBucket {
  Other,
  Digit,
  Unit,
}

impl TokenBucket {
  pub fn classify(label: &str) -> Self {
    let is_digit = !label.is_empty() && label.chars().all(|c| c.is_ascii_digit());
    if is_digit || SEPARATORS.contains(&label) {
      TokenBucket::Digit
    } else if UNITS.contains(&label) {
      TokenBucket::Unit
    } else {
      TokenBucket::Other
    }
  }
}
