// 该文件是 LifeLens （慧眼） 项目的一部分。
// src/input/image_file.rs - 图像文件摄像头
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

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::CapturedFrame,
  input::{Camera, CameraError},
  utils::url_path,
};

#[derive(Error, Debug)]
pub enum ImageFileCameraError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

impl From<ImageFileCameraError> for CameraError {
  fn from(err: ImageFileCameraError) -> Self {
    match err {
      ImageFileCameraError::SchemaMismatch => CameraError::SchemeMismatch,
      ImageFileCameraError::IoError(e) => CameraError::CameraUnavailable(e.to_string()),
      ImageFileCameraError::ImageLoadError(e) => CameraError::CaptureError(e.to_string()),
    }
  }
}

const READ_IMAGE_FILE_SCHEME: &str = "image";

/// 把磁盘上的图像文件当作摄像头，每次采集都重新读取文件
pub struct ImageFileCamera {
  path: PathBuf,
}

impl FromUrl for ImageFileCamera {
  type Error = ImageFileCameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != READ_IMAGE_FILE_SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        READ_IMAGE_FILE_SCHEME,
        url.scheme()
      );
      return Err(ImageFileCameraError::SchemaMismatch);
    }

    let path = url_path(url);
    if !path.is_file() {
      return Err(ImageFileCameraError::IoError(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("找不到图像文件: {}", path.display()),
      )));
    }

    Ok(ImageFileCamera { path })
  }
}

impl FromUrlWithScheme for ImageFileCamera {
  const SCHEME: &'static str = READ_IMAGE_FILE_SCHEME;
}

fn read_frame(path: &Path) -> Result<CapturedFrame, ImageFileCameraError> {
  let image: RgbImage = ImageReader::open(path)?.decode()?.to_rgb8();
  let (width, height) = image.dimensions();
  debug!("读取图像 {}: {}x{}", path.display(), width, height);
  Ok(CapturedFrame::new(image.into_raw(), width, height))
}

#[async_trait]
impl Camera for ImageFileCamera {
  async fn acquire_frame(&self) -> Result<CapturedFrame, CameraError> {
    let path = self.path.clone();
    let frame = tokio::task::spawn_blocking(move || read_frame(&path))
      .await
      .map_err(|e| CameraError::CaptureError(e.to_string()))??;
    Ok(frame)
  }
}
