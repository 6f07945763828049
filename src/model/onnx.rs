// 该文件是 LifeLens （慧眼） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 模型
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 LifeLens Contributors

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::Array4;
use ort::{
  execution_providers::CPUExecutionProvider,
  session::{Session as OrtSession, builder::GraphOptimizationLevel},
  value::Value,
};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{OutputTensor, RawOutput, Tensor},
  model::{ModelError, Session},
  utils::url_path,
};

#[derive(Error, Debug)]
pub enum OnnxModelError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("模型文件不存在: {0}")]
  NotFound(String),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(String),
  #[error("后台任务错误: {0}")]
  JoinError(#[from] tokio::task::JoinError),
}

const ONNX_SCHEME: &str = "onnx";
const ONNX_INTRA_THREADS: usize = 2;

/// ONNX Runtime 推理会话，仅使用 CPU
pub struct OnnxModel {
  session: Arc<Mutex<Option<OrtSession>>>,
  input_name: String,
}

impl FromUrl for OnnxModel {
  type Error = OnnxModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != ONNX_SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        ONNX_SCHEME,
        url.scheme()
      );
      return Err(OnnxModelError::SchemeMismatch);
    }

    let path = url_path(url);
    if !path.exists() {
      return Err(OnnxModelError::NotFound(path.display().to_string()));
    }

    info!("加载模型文件: {}", path.display());
    let session = OrtSession::builder()
      .map_err(|e| OnnxModelError::OrtError(e.to_string()))?
      .with_execution_providers([CPUExecutionProvider::default().build()])
      .map_err(|e| OnnxModelError::OrtError(e.to_string()))?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(|e| OnnxModelError::OrtError(e.to_string()))?
      .with_intra_threads(ONNX_INTRA_THREADS)
      .map_err(|e| OnnxModelError::OrtError(e.to_string()))?
      .commit_from_file(&path)
      .map_err(|e| OnnxModelError::OrtError(e.to_string()))?;

    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .unwrap_or_else(|| "images".to_string());
    debug!("模型输入: {}, 输出数量: {}", input_name, session.outputs.len());
    info!("模型加载完成");

    Ok(OnnxModel {
      session: Arc::new(Mutex::new(Some(session))),
      input_name,
    })
  }
}

impl FromUrlWithScheme for OnnxModel {
  const SCHEME: &'static str = ONNX_SCHEME;
}

impl OnnxModel {
  pub async fn open(url: &Url) -> Result<Self, OnnxModelError> {
    let url = url.clone();
    tokio::task::spawn_blocking(move || Self::from_url(&url)).await?
  }
}

fn run_blocking(
  session: &Mutex<Option<OrtSession>>,
  input_name: &str,
  input: Tensor,
) -> Result<RawOutput, ModelError> {
  let mut guard = session
    .lock()
    .map_err(|_| ModelError::InferenceError("会话锁已损坏".to_string()))?;
  let session = guard.as_mut().ok_or(ModelError::Released)?;

  let [n, a, b, c] = input.shape;
  let array = Array4::from_shape_vec((n, a, b, c), input.data.into_vec())
    .map_err(|e| ModelError::InferenceError(e.to_string()))?;
  let value = Value::from_array(array).map_err(|e| ModelError::InferenceError(e.to_string()))?;

  let outputs = session
    .run(ort::inputs![input_name => value])
    .map_err(|e| ModelError::InferenceError(e.to_string()))?;

  let mut tensors = Vec::with_capacity(outputs.len());
  for (_, output) in outputs.iter() {
    let array = output
      .try_extract_array::<f32>()
      .map_err(|e| ModelError::InferenceError(e.to_string()))?;
    tensors.push(OutputTensor {
      shape: array.shape().to_vec(),
      data: array.iter().copied().collect(),
    });
  }

  Ok(RawOutput { outputs: tensors })
}

#[async_trait]
impl Session for OnnxModel {
  async fn run(&self, input: Tensor) -> Result<RawOutput, ModelError> {
    let session = self.session.clone();
    let input_name = self.input_name.clone();
    tokio::task::spawn_blocking(move || run_blocking(&session, &input_name, input))
      .await
      .map_err(|e| ModelError::InferenceError(e.to_string()))?
  }

  async fn release(&self) {
    let session = self.session.clone();
    // 等待进行中的推理结束后再丢弃会话
    let released = tokio::task::spawn_blocking(move || {
      if let Ok(mut guard) = session.lock() {
        guard.take();
      }
    })
    .await;
    if let Err(e) = released {
      error!("释放模型会话失败: {}", e);
    }
    info!("模型会话已释放");
  }
}
