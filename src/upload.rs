// 该文件是 Shanan （山南西风） 项目的一部分。
// src/upload.rs - 上传文件暂存
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

use tracing::{debug, warn};

pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// 扩展名区分大小写，取最后一个 `.` 之后的部分
pub fn allowed_filename(filename: &str) -> bool {
  filename
    .rsplit_once('.')
    .is_some_and(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext))
}

/// 将客户端提供的文件名清理为安全的本地文件名
///
/// 路径分隔符视为空白，空白折叠为 `_`，只保留 ASCII 字母、数字与 `_.-`，
/// 去掉首尾的 `.` 与 `_`。清理后为空时返回 `None`。
///
/// 非 ASCII 字符直接丢弃，不做 NFKD 折叠，`café.jpg` 得到 `caf.jpg`。
/// 暂存文件名带有请求序号前缀，不会因此冲突。
pub fn secure_filename(filename: &str) -> Option<String> {
  let spaced: String = filename
    .chars()
    .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
    .collect();
  let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
  let kept: String = joined
    .chars()
    .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    .collect();
  let trimmed = kept.trim_matches(|c| c == '.' || c == '_');

  if trimmed.is_empty() {
    None
  } else {
    Some(trimmed.to_string())
  }
}

/// 暂存在上传目录中的文件，离开作用域时删除
#[derive(Debug)]
pub struct StagedUpload {
  path: PathBuf,
}

impl StagedUpload {
  pub async fn stage(
    directory: &Path,
    sequence: u64,
    filename: &str,
    data: &[u8],
  ) -> Result<Self, std::io::Error> {
    tokio::fs::create_dir_all(directory).await?;
    let path = directory.join(format!("{:08X}-{}", sequence, filename));
    tokio::fs::write(&path, data).await?;
    debug!("上传文件已暂存: {} ({} 字节)", path.display(), data.len());
    Ok(Self { path })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Drop for StagedUpload {
  fn drop(&mut self) {
    match std::fs::remove_file(&self.path) {
      Ok(()) => debug!("已删除上传文件: {}", self.path.display()),
      Err(e) => warn!("删除上传文件 {} 失败: {}", self.path.display(), e),
    }
  }
}
