// 该文件是 LifeLens （慧眼） 项目的一部分。
// src/frame.rs - 帧与张量定义
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

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

pub const RGB_CHANNELS: usize = 3;

/// 摄像头采集的一帧 RGB 图像（HWC 交错排列）
#[derive(Debug, Clone)]
pub struct CapturedFrame {
  data: Box<[u8]>,
  width: u32,
  height: u32,
  captured_at: DateTime<Local>,
}

impl CapturedFrame {
  pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
    Self::with_timestamp(data, width, height, Local::now())
  }

  pub fn with_timestamp(
    data: Vec<u8>,
    width: u32,
    height: u32,
    captured_at: DateTime<Local>,
  ) -> Self {
    Self {
      data: data.into_boxed_slice(),
      width,
      height,
      captured_at,
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn captured_at(&self) -> DateTime<Local> {
    self.captured_at
  }

  /// 取 (x, y) 处像素，调用方保证坐标在范围内
  pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
    let index = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
    &self.data[index..index + RGB_CHANNELS]
  }
}

impl AsRef<[u8]> for CapturedFrame {
  fn as_ref(&self) -> &[u8] {
    &self.data
  }
}

/// 张量内存布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
  /// [1, H, W, C]
  Nhwc,
  /// [1, C, H, W]
  Nchw,
}

/// 归一化后的取值范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueRange {
  /// [0, 1]
  ZeroToOne,
  /// [-1, 1]
  MinusOneToOne,
}

impl ValueRange {
  /// 将 0-255 的通道值线性映射到目标范围
  pub fn normalize(&self, value: u8) -> f32 {
    let unit = value as f32 / 255.0;
    match self {
      ValueRange::ZeroToOne => unit,
      ValueRange::MinusOneToOne => unit * 2.0 - 1.0,
    }
  }
}

/// 模型输入张量
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
  pub data: Box<[f32]>,
  pub shape: [usize; 4],
  pub layout: TensorLayout,
  pub range: ValueRange,
}

impl Tensor {
  pub fn height(&self) -> usize {
    match self.layout {
      TensorLayout::Nhwc => self.shape[1],
      TensorLayout::Nchw => self.shape[2],
    }
  }

  pub fn width(&self) -> usize {
    match self.layout {
      TensorLayout::Nhwc => self.shape[2],
      TensorLayout::Nchw => self.shape[3],
    }
  }
}

/// 模型的单个输出张量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputTensor {
  pub shape: Vec<usize>,
  pub data: Vec<f32>,
}

/// 模型原始输出
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawOutput {
  pub outputs: Vec<OutputTensor>,
}

impl RawOutput {
  pub fn single(shape: Vec<usize>, data: Vec<f32>) -> Self {
    Self {
      outputs: vec![OutputTensor { shape, data }],
    }
  }
}
