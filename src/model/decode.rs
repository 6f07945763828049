// 该文件是 LifeLens （慧眼） 项目的一部分。
// src/model/decode.rs - 锚点输出解码
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

use thiserror::Error;
use tracing::debug;

use crate::{
  frame::RawOutput,
  model::{BoundingBox, Detection, labels::LabelTable},
};

/// 通道 0-3 为框，4 为置信度，其后为各类别分数
const BOX_CHANNELS: usize = 4;
const CONFIDENCE_CHANNEL: usize = 4;
const CLASS_OFFSET: usize = 5;

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
  #[error("模型没有输出")]
  NoOutput,
  #[error("输出形状 {0:?} 不是 [1, C, N]")]
  BadRank(Vec<usize>),
  #[error("输出通道数 {actual} 与类别数不符, 期望 {expected}")]
  ChannelMismatch { expected: usize, actual: usize },
  #[error("输出数据长度 {actual}, 期望 {expected}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 解码形如 `[1, num_classes + 5, num_anchors]` 的输出
///
/// 只做逐锚点的置信度过滤和类别 argmax，不做跨锚点的 NMS，
/// 同一物体可能产生多个重叠的检测结果。结果按锚点顺序排列。
pub fn decode(
  raw: &RawOutput,
  num_classes: usize,
  threshold: f32,
  labels: &LabelTable,
) -> Result<Vec<Detection>, DecodeError> {
  let output = raw.outputs.first().ok_or(DecodeError::NoOutput)?;

  let (channels, anchors) = match output.shape.as_slice() {
    [1, channels, anchors] => (*channels, *anchors),
    shape => return Err(DecodeError::BadRank(shape.to_vec())),
  };

  let expected_channels = num_classes + CLASS_OFFSET;
  if channels != expected_channels {
    return Err(DecodeError::ChannelMismatch {
      expected: expected_channels,
      actual: channels,
    });
  }

  let expected_len = channels * anchors;
  if output.data.len() != expected_len {
    return Err(DecodeError::LengthMismatch {
      expected: expected_len,
      actual: output.data.len(),
    });
  }

  let data = output.data.as_slice();
  let at = |channel: usize, anchor: usize| data[channel * anchors + anchor];

  let mut detections = Vec::new();
  for i in 0..anchors {
    let confidence = at(CONFIDENCE_CHANNEL, i);
    // NaN 也视为低于阈值
    if !(confidence >= threshold) {
      continue;
    }

    let mut class_id = 0usize;
    let mut best = f32::NEG_INFINITY;
    for c in 0..num_classes {
      let score = at(CLASS_OFFSET + c, i);
      if score > best {
        best = score;
        class_id = c;
      }
    }

    let [cx, cy, w, h]: [f32; BOX_CHANNELS] = std::array::from_fn(|k| at(k, i));
    let (label, category) = labels.resolve(class_id as u32);

    detections.push(Detection {
      bbox: BoundingBox {
        x: cx - w / 2.0,
        y: cy - h / 2.0,
        width: w,
        height: h,
      },
      confidence,
      class_id: class_id as u32,
      label,
      category,
    });
  }

  debug!("解码得到 {} 个检测结果 (锚点 {})", detections.len(), anchors);
  Ok(detections)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Category;

  /// 按 [1, C, N] 布局构造输出，`anchors` 每项为 (框, 置信度, 类别分数)
  fn build_output(num_classes: usize, anchors: &[([f32; 4], f32, Vec<f32>)]) -> RawOutput {
    let n = anchors.len();
    let channels = num_classes + 5;
    let mut data = vec![0f32; channels * n];
    for (i, (bbox, conf, scores)) in anchors.iter().enumerate() {
      for k in 0..4 {
        data[k * n + i] = bbox[k];
      }
      data[4 * n + i] = *conf;
      for (c, s) in scores.iter().enumerate() {
        data[(5 + c) * n + i] = *s;
      }
    }
    RawOutput::single(vec![1, channels, n], data)
  }

  #[test]
  fn test_currency_anchor_decodes_to_fifty_rupees() {
    let mut scores = vec![0.1; 7];
    scores[2] = 0.8;
    let raw = build_output(
      7,
      &[
        ([0.5, 0.5, 0.2, 0.4], 0.3, vec![0.9; 7]),
        ([0.5, 0.5, 0.2, 0.4], 0.9, scores),
      ],
    );

    let detections = decode(&raw, 7, 0.5, &LabelTable::currency()).unwrap();
    assert_eq!(detections.len(), 1);
    let det = &detections[0];
    assert_eq!(det.label, "50 Rupees");
    assert_eq!(det.class_id, 2);
    assert_eq!(det.confidence, 0.9);
    assert_eq!(det.category, Category::Primary);
    assert!((det.bbox.x - 0.4).abs() < 1e-6);
    assert!((det.bbox.y - 0.3).abs() < 1e-6);
    assert_eq!(det.bbox.width, 0.2);
    assert_eq!(det.bbox.height, 0.4);
  }

  #[test]
  fn test_every_detection_meets_threshold() {
    let confidences = [0.0, 0.49, 0.5, 0.51, 0.99, f32::NAN, 1.0, 0.2];
    let anchors: Vec<_> = confidences
      .iter()
      .map(|&c| ([0.5, 0.5, 0.1, 0.1], c, vec![0.3, 0.7]))
      .collect();
    let raw = build_output(2, &anchors);
    let labels = LabelTable::from_names(&["a", "b"], |_| false);

    for threshold in [0.0, 0.25, 0.5, 0.75, 1.0] {
      let detections = decode(&raw, 2, threshold, &labels).unwrap();
      assert!(detections.iter().all(|d| d.confidence >= threshold));
    }
    let baseline = decode(&raw, 2, 0.5, &labels).unwrap();
    assert_eq!(baseline.len(), 4);
  }

  #[test]
  fn test_argmax_ties_pick_lowest_class() {
    let raw = build_output(3, &[([0.5; 4], 0.8, vec![0.2, 0.6, 0.6])]);
    let labels = LabelTable::from_names(&["a", "b", "c"], |_| true);
    let detections = decode(&raw, 3, 0.5, &labels).unwrap();
    assert_eq!(detections[0].class_id, 1);
    assert_eq!(detections[0].label, "b");
  }

  #[test]
  fn test_unmapped_class_uses_fallback_label() {
    let raw = build_output(3, &[([0.5; 4], 0.8, vec![0.0, 0.0, 1.0])]);
    let labels = LabelTable::from_names(&["a", "b"], |_| true);
    let detections = decode(&raw, 3, 0.5, &labels).unwrap();
    assert_eq!(detections[0].label, "Class 2");
    assert_eq!(detections[0].category, Category::Generic);
  }

  #[test]
  fn test_overlapping_anchors_are_not_suppressed() {
    let raw = build_output(
      1,
      &[
        ([0.5, 0.5, 0.2, 0.2], 0.9, vec![1.0]),
        ([0.51, 0.5, 0.2, 0.2], 0.8, vec![1.0]),
      ],
    );
    let labels = LabelTable::from_names(&["a"], |_| true);
    let detections = decode(&raw, 1, 0.5, &labels).unwrap();
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].confidence, 0.9);
    assert_eq!(detections[1].confidence, 0.8);
  }

  #[test]
  fn test_shape_contract_violations() {
    let labels = LabelTable::currency();
    assert_eq!(
      decode(&RawOutput::default(), 7, 0.5, &labels).unwrap_err(),
      DecodeError::NoOutput
    );
    assert_eq!(
      decode(&RawOutput::single(vec![12, 4], vec![0.0; 48]), 7, 0.5, &labels).unwrap_err(),
      DecodeError::BadRank(vec![12, 4])
    );
    assert_eq!(
      decode(&RawOutput::single(vec![1, 11, 2], vec![0.0; 22]), 7, 0.5, &labels).unwrap_err(),
      DecodeError::ChannelMismatch {
        expected: 12,
        actual: 11
      }
    );
    assert_eq!(
      decode(&RawOutput::single(vec![1, 12, 2], vec![0.0; 20]), 7, 0.5, &labels).unwrap_err(),
      DecodeError::LengthMismatch {
        expected: 24,
        actual: 20
      }
    );
  }
}
