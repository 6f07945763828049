// 该文件是 LifeLens （慧眼） 项目的一部分。
// src/model.rs - 模型
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

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use url::Url;

use crate::frame::{RawOutput, Tensor};

pub mod decode;
pub mod labels;

mod replay;
pub use self::replay::{ReplayModel, ReplayModelError};

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxModel, OnnxModelError};

pub use self::decode::{DecodeError, decode};
pub use self::labels::{LabelSpec, LabelTable, LabelTableError};

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(String),
  #[error("推理错误: {0}")]
  InferenceError(String),
  #[error("会话已释放")]
  Released,
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 检测类别的播报优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
  /// 领域关键类别（如纸币面额），优先播报
  Primary,
  Generic,
}

/// 归一化的左上角坐标框
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

/// 屏幕尺寸
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
  pub width: f32,
  pub height: f32,
}

impl BoundingBox {
  /// 映射到屏幕坐标
  pub fn scale(&self, viewport: Viewport) -> BoundingBox {
    BoundingBox {
      x: self.x * viewport.width,
      y: self.y * viewport.height,
      width: self.width * viewport.width,
      height: self.height * viewport.height,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub bbox: BoundingBox,
  pub confidence: f32,
  pub class_id: u32,
  pub label: String,
  pub category: Category,
}

/// 已加载的推理会话
#[async_trait]
pub trait Session: Send + Sync {
  async fn run(&self, input: Tensor) -> Result<RawOutput, ModelError>;

  /// 释放底层资源，之后的 `run` 返回 `ModelError::Released`
  async fn release(&self);
}

/// 根据模型地址创建推理会话
#[async_trait]
pub trait ModelLoader: Send + Sync {
  async fn load(&self, model: &Url) -> Result<Arc<dyn Session>, ModelError>;
}

/// 按 URI 方案分派到具体模型实现
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemeModelLoader;

#[async_trait]
impl ModelLoader for SchemeModelLoader {
  async fn load(&self, model: &Url) -> Result<Arc<dyn Session>, ModelError> {
    use crate::FromUrlWithScheme;

    match model.scheme() {
      ReplayModel::SCHEME => {
        let session = ReplayModel::open(model)
          .await
          .map_err(|e| ModelError::ModelLoadError(e.to_string()))?;
        Ok(Arc::new(session))
      }
      #[cfg(feature = "onnx")]
      OnnxModel::SCHEME => {
        let session = OnnxModel::open(model)
          .await
          .map_err(|e| ModelError::ModelLoadError(e.to_string()))?;
        Ok(Arc::new(session))
      }
      scheme => {
        error!("不支持的模型方案: {}", scheme);
        Err(ModelError::SchemeMismatch(scheme.to_string()))
      }
    }
  }
}
