// 该文件是 Shanan （山南西风） 项目的一部分。
// src/server.rs - HTTP 接口
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
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
  Json, Router,
  extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::post,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::{
  pipeline::Reading,
  upload::{StagedUpload, allowed_filename, secure_filename},
  worker::{InferenceWorker, WorkerError},
};

const UPLOAD_FIELD: &str = "file";

#[derive(Clone)]
pub struct AppState {
  worker: Arc<InferenceWorker>,
  upload_dir: Arc<PathBuf>,
  sequence: Arc<AtomicU64>,
}

impl AppState {
  pub fn new(worker: Arc<InferenceWorker>, upload_dir: PathBuf) -> Self {
    Self {
      worker,
      upload_dir: Arc::new(upload_dir),
      sequence: Arc::new(AtomicU64::new(0)),
    }
  }
}

#[derive(Error, Debug)]
pub enum ServerError {
  #[error("上传请求格式错误: {0}")]
  BadRequest(#[from] MultipartError),
  #[error("缺少上传字段 'file'")]
  MissingField,
  #[error("暂存上传文件失败: {0}")]
  StageError(#[from] std::io::Error),
  #[error("识别失败: {0}")]
  WorkerError(#[from] WorkerError),
}

impl IntoResponse for ServerError {
  fn into_response(self) -> Response {
    match self {
      ServerError::BadRequest(ref e) => {
        warn!("{}", self);
        (e.status(), Json(Reading::file_error())).into_response()
      }
      ServerError::MissingField => {
        warn!("{}", self);
        (StatusCode::BAD_REQUEST, Json(Reading::file_error())).into_response()
      }
      ServerError::StageError(_) | ServerError::WorkerError(_) => {
        error!("{}", self);
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
      }
    }
  }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
  Router::new()
    .route("/_pics", post(recognize_upload))
    .layer(DefaultBodyLimit::max(max_upload_bytes))
    .with_state(state)
}

/// 校验不通过时仍返回 200 与 `{"NUM": null}`
async fn recognize_upload(
  State(state): State<AppState>,
  mut multipart: Multipart,
) -> Result<Json<Reading>, ServerError> {
  let mut upload = None;
  while let Some(field) = multipart.next_field().await? {
    if field.name() == Some(UPLOAD_FIELD) {
      let filename = field.file_name().unwrap_or_default().to_string();
      let data = field.bytes().await?;
      upload = Some((filename, data));
      break;
    }
  }
  let (filename, data) = upload.ok_or(ServerError::MissingField)?;

  info!("收到图像: {} ({} 字节)", filename, data.len());
  // 扩展名合法时清理结果至少保留扩展名
  let safe_name = match secure_filename(&filename) {
    Some(name) if allowed_filename(&filename) => name,
    _ => {
      warn!("不支持的文件类型: {}", filename);
      return Ok(Json(Reading::file_error()));
    }
  };

  let sequence = state.sequence.fetch_add(1, Ordering::Relaxed);
  let staged = StagedUpload::stage(&state.upload_dir, sequence, &safe_name, &data).await?;
  let reading = state.worker.recognize(staged.path().to_path_buf()).await?;

  Ok(Json(reading))
}

pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
  info!("服务监听于 {}", listener.local_addr()?);
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn shutdown_signal() {
  match tokio::signal::ctrl_c().await {
    Ok(()) => info!("收到中断信号，准备退出..."),
    Err(e) => {
      error!("无法监听中断信号: {}", e);
      std::future::pending::<()>().await;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    model::{Detection, DetectorConfig, FixtureDetector, FixtureDetectorError},
    pipeline::OcrPipeline,
  };
  use axum::body::Body;
  use axum::http::Request;
  use image::{ImageFormat, Rgb, RgbImage};
  use std::io::Cursor;
  use tower::ServiceExt;

  const BOUNDARY: &str = "shanan-boundary";

  fn app(upload_dir: PathBuf, lcd_score: f32) -> Router {
    app_with_limit(upload_dir, lcd_score, 1024 * 1024)
  }

  fn app_with_limit(upload_dir: PathBuf, lcd_score: f32, max_upload_bytes: usize) -> Router {
    let worker = InferenceWorker::spawn(move || {
      let lcd = FixtureDetector::new(
        DetectorConfig::lcd(),
        vec![Detection {
          bbox: [2.0, 2.0, 30.0, 60.0],
          class_id: 1,
          score: lcd_score,
        }],
      )?;
      let glyph = FixtureDetector::new(
        DetectorConfig::glyph(),
        vec![
          Detection {
            bbox: [0.0, 40.0, 20.0, 55.0],
            class_id: 34,
            score: 0.9,
          },
          Detection {
            bbox: [0.0, 0.0, 20.0, 10.0],
            class_id: 5,
            score: 0.9,
          },
          Detection {
            bbox: [0.0, 10.0, 20.0, 20.0],
            class_id: 8,
            score: 0.9,
          },
        ],
      )?;
      Ok::<_, FixtureDetectorError>(OcrPipeline::new(lcd, glyph))
    })
    .unwrap();
    router(AppState::new(Arc::new(worker), upload_dir), max_upload_bytes)
  }

  fn png_bytes() -> Vec<u8> {
    let mut data = Vec::new();
    RgbImage::from_pixel(64, 32, Rgb([10, 20, 30]))
      .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
      .unwrap();
    data
  }

  fn upload(field: &str, filename: &str, data: &[u8]) -> Request<Body> {
    let mut body = format!(
      "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
      .method("POST")
      .uri("/_pics")
      .header(
        "content-type",
        format!("multipart/form-data; boundary={BOUNDARY}"),
      )
      .body(Body::from(body))
      .unwrap()
  }

  async fn call(app: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
      .await
      .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn reads_uploaded_scale_photo() {
    let dir = tempfile::tempdir().unwrap();
    let upload_dir = dir.path().join("_pics");
    let app = app(upload_dir.clone(), 0.9);

    let (status, body) = call(app, upload("file", "scale.png", &png_bytes())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"NUM":["3","6","kcal"]}"#);
    assert_eq!(std::fs::read_dir(&upload_dir).unwrap().count(), 0);
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn weak_lcd_reads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path().join("_pics"), 0.5);

    let (status, body) = call(app, upload("file", "scale.jpg", &png_bytes())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"NUM":[]}"#);
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn rejects_unsupported_extension_with_null() {
    let dir = tempfile::tempdir().unwrap();
    let upload_dir = dir.path().join("_pics");
    let app = app(upload_dir.clone(), 0.9);

    let (status, body) = call(app, upload("file", "scale.GIF", &png_bytes())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"NUM":null}"#);
    assert!(!upload_dir.exists());
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn missing_file_field_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path().join("_pics"), 0.9);

    let (status, body) = call(app, upload("image", "scale.png", &png_bytes())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"NUM":null}"#);
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn oversized_upload_is_payload_too_large() {
    let dir = tempfile::tempdir().unwrap();
    let upload_dir = dir.path().join("_pics");
    let app = app_with_limit(upload_dir.clone(), 0.9, 1024);

    let (status, body) = call(app, upload("file", "scale.png", &[0u8; 4096])).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body, r#"{"NUM":null}"#);
    assert!(!upload_dir.exists());
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn undecodable_upload_is_internal_error() {
    let dir = tempfile::tempdir().unwrap();
    let upload_dir = dir.path().join("_pics");
    let app = app(upload_dir.clone(), 0.9);

    let (status, _) = call(app, upload("file", "scale.png", b"not an image")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(std::fs::read_dir(&upload_dir).unwrap().count(), 0);
  }
}
