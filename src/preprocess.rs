// 该文件是 LifeLens （慧眼） 项目的一部分。
// src/preprocess.rs - 图像预处理
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

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::{CapturedFrame, RGB_CHANNELS, Tensor, TensorLayout, ValueRange};

#[derive(Error, Debug, PartialEq)]
pub enum PreprocessError {
  #[error("无效帧: 尺寸为 {width}x{height}")]
  InvalidFrame { width: u32, height: u32 },
  #[error("无效帧: 数据长度 {actual}, 期望 {expected}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("无效目标尺寸: {0}x{1}")]
  InvalidTarget(u32, u32),
}

/// 模型输入约定
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
  pub width: u32,
  pub height: u32,
  pub layout: TensorLayout,
  pub range: ValueRange,
}

impl InputSpec {
  pub fn shape(&self) -> [usize; 4] {
    let (w, h) = (self.width as usize, self.height as usize);
    match self.layout {
      TensorLayout::Nhwc => [1, h, w, RGB_CHANNELS],
      TensorLayout::Nchw => [1, RGB_CHANNELS, h, w],
    }
  }
}

/// 最近邻缩放并归一化为模型输入张量
///
/// 目标像素 (x, y) 取自源像素 `(floor(x * srcW / dstW), floor(y * srcH / dstH))`，
/// 相同输入总是得到逐位相同的输出。
pub fn preprocess(frame: &CapturedFrame, spec: &InputSpec) -> Result<Tensor, PreprocessError> {
  let (src_w, src_h) = (frame.width(), frame.height());
  if src_w == 0 || src_h == 0 {
    return Err(PreprocessError::InvalidFrame {
      width: src_w,
      height: src_h,
    });
  }

  let expected = src_w as usize * src_h as usize * RGB_CHANNELS;
  let actual = frame.as_ref().len();
  if actual != expected {
    return Err(PreprocessError::LengthMismatch { expected, actual });
  }

  if spec.width == 0 || spec.height == 0 {
    return Err(PreprocessError::InvalidTarget(spec.width, spec.height));
  }

  let (dst_w, dst_h) = (spec.width as usize, spec.height as usize);
  let plane = dst_w * dst_h;
  let mut data = vec![0f32; plane * RGB_CHANNELS];

  // 整数运算保证 floor 语义且无浮点误差
  let src_xs: Vec<u32> = (0..dst_w)
    .map(|x| (x as u64 * src_w as u64 / dst_w as u64) as u32)
    .collect();

  for y in 0..dst_h {
    let sy = (y as u64 * src_h as u64 / dst_h as u64) as u32;
    for (x, &sx) in src_xs.iter().enumerate() {
      let pixel = frame.pixel(sx, sy);
      for c in 0..RGB_CHANNELS {
        let index = match spec.layout {
          TensorLayout::Nhwc => (y * dst_w + x) * RGB_CHANNELS + c,
          TensorLayout::Nchw => c * plane + y * dst_w + x,
        };
        data[index] = spec.range.normalize(pixel[c]);
      }
    }
  }

  Ok(Tensor {
    data: data.into_boxed_slice(),
    shape: spec.shape(),
    layout: spec.layout,
    range: spec.range,
  })
}
