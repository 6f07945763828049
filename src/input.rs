// 该文件是 LifeLens （慧眼） 项目的一部分。
// src/input.rs - 摄像头输入
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
use thiserror::Error;

use crate::{FromUrl, frame::CapturedFrame};

#[cfg(feature = "read_image_file")]
mod image_file;
#[cfg(feature = "read_image_file")]
pub use self::image_file::{ImageFileCamera, ImageFileCameraError};

#[derive(Error, Debug)]
pub enum CameraError {
  #[error("摄像头权限被拒绝")]
  PermissionDenied,
  #[error("摄像头不可用: {0}")]
  CameraUnavailable(String),
  #[error("采集失败: {0}")]
  CaptureError(String),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 摄像头能力
#[async_trait]
pub trait Camera: Send + Sync {
  /// 请求摄像头权限，默认总是允许
  async fn request_permission(&self) -> Result<(), CameraError> {
    Ok(())
  }

  async fn acquire_frame(&self) -> Result<CapturedFrame, CameraError>;
}

/// 固定返回同一帧的摄像头
pub struct StillCamera {
  frame: CapturedFrame,
}

impl StillCamera {
  pub fn new(frame: CapturedFrame) -> Self {
    Self { frame }
  }
}

#[async_trait]
impl Camera for StillCamera {
  async fn acquire_frame(&self) -> Result<CapturedFrame, CameraError> {
    let frame = &self.frame;
    Ok(CapturedFrame::new(
      frame.as_ref().to_vec(),
      frame.width(),
      frame.height(),
    ))
  }
}

/// 按 URI 方案创建摄像头
impl FromUrl for Arc<dyn Camera> {
  type Error = CameraError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileCamera::SCHEME {
        let camera = ImageFileCamera::from_url(url)?;
        return Ok(Arc::new(camera));
      }
    }
    tracing::error!("不支持的摄像头方案: {}", url.scheme());
    Err(CameraError::SchemeMismatch)
  }
}
