// 该文件是 Shanan （山南西风） 项目的一部分。
// src/worker.rs - 推理线程
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
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, bounded, unbounded};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::{
  model::Detector,
  pipeline::{OcrPipeline, PipelineError, Reading},
};

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum WorkerError {
  #[error("无法创建推理线程: {0}")]
  SpawnError(#[from] std::io::Error),
  #[error("模型加载失败: {0}")]
  StartupError(#[source] BoxedError),
  #[error("推理线程已停止")]
  Stopped,
  #[error("{0}")]
  PipelineError(#[from] PipelineError),
}

struct Job {
  path: PathBuf,
  reply: oneshot::Sender<Result<Reading, PipelineError>>,
}

/// 独占检测模型的推理线程
///
/// 模型在线程内加载并常驻，所有请求经队列依次执行，检测器不会被并发调用。
pub struct InferenceWorker {
  sender: Option<Sender<Job>>,
  handle: Option<JoinHandle<()>>,
}

impl InferenceWorker {
  /// 启动推理线程并等待模型加载完成
  pub fn spawn<F, L, G, E>(init: F) -> Result<Self, WorkerError>
  where
    F: FnOnce() -> Result<OcrPipeline<L, G>, E> + Send + 'static,
    L: Detector,
    G: Detector,
    E: std::error::Error + Send + Sync + 'static,
  {
    let (sender, receiver) = unbounded::<Job>();
    let (ready_tx, ready_rx) = bounded::<Result<(), BoxedError>>(1);

    let handle = std::thread::Builder::new()
      .name("inference".to_string())
      .spawn(move || {
        let pipeline = match init() {
          Ok(pipeline) => {
            let _ = ready_tx.send(Ok(()));
            pipeline
          }
          Err(e) => {
            error!("模型加载失败: {}", e);
            let e: BoxedError = Box::new(e);
            let _ = ready_tx.send(Err(e));
            return;
          }
        };

        info!("推理线程就绪");
        for job in receiver {
          let result = pipeline.run(&job.path);
          if job.reply.send(result).is_err() {
            warn!("请求方已放弃等待: {}", job.path.display());
          }
        }
        info!("推理线程退出");
      })?;

    match ready_rx.recv() {
      Ok(Ok(())) => Ok(Self {
        sender: Some(sender),
        handle: Some(handle),
      }),
      Ok(Err(e)) => {
        let _ = handle.join();
        Err(WorkerError::StartupError(e))
      }
      Err(_) => {
        let _ = handle.join();
        Err(WorkerError::Stopped)
      }
    }
  }

  /// 将图像交给推理线程识别
  pub async fn recognize(&self, path: PathBuf) -> Result<Reading, WorkerError> {
    let sender = self.sender.as_ref().ok_or(WorkerError::Stopped)?;
    let (reply, response) = oneshot::channel();
    sender
      .send(Job { path, reply })
      .map_err(|_| WorkerError::Stopped)?;
    let result = response.await.map_err(|_| WorkerError::Stopped)?;
    Ok(result?)
  }

  /// 关闭队列，等待排队中的请求处理完毕后退出
  pub fn shutdown(mut self) {
    self.stop();
  }

  fn stop(&mut self) {
    drop(self.sender.take());
    if let Some(handle) = self.handle.take()
      && handle.join().is_err()
    {
      error!("推理线程异常退出");
    }
  }
}

impl Drop for InferenceWorker {
  fn drop(&mut self) {
    self.stop();
  }
}
