// 该文件是 LifeLens （慧眼） 项目的一部分。
// src/model/labels.rs - 类别标签表
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

use crate::model::Category;

/// 印度卢比纸币面额
pub const CURRENCY_CLASSES: [&str; 7] = [
  "10 Rupees",
  "20 Rupees",
  "50 Rupees",
  "100 Rupees",
  "200 Rupees",
  "500 Rupees",
  "2000 Rupees",
];

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

/// 障碍模式下需要优先播报的 COCO 类别
pub const HURDLE_CLASSES: [&str; 17] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "bus",
  "train",
  "truck",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "dog",
  "chair",
  "couch",
  "potted plant",
  "dining table",
];

#[derive(Error, Debug, PartialEq)]
pub enum LabelTableError {
  #[error("类别数量为 0")]
  Empty,
  #[error("类别 {0} 缺少标签")]
  MissingClass(u32),
  #[error("类别 {0} 重复定义")]
  DuplicateClass(u32),
  #[error("类别 {id} 超出范围 [0, {num_classes})")]
  OutOfRange { id: u32, num_classes: usize },
}

/// 配置文件中的单个标签项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSpec {
  pub id: u32,
  pub label: String,
  pub category: Category,
}

/// 不可变的类别标签表，构造时保证 `[0, num_classes)` 每个类别都有标签
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable {
  entries: Box<[(String, Category)]>,
}

impl LabelTable {
  pub fn try_new(num_classes: usize, specs: &[LabelSpec]) -> Result<Self, LabelTableError> {
    if num_classes == 0 {
      return Err(LabelTableError::Empty);
    }

    let mut slots: Vec<Option<(String, Category)>> = vec![None; num_classes];
    for spec in specs {
      let slot = slots
        .get_mut(spec.id as usize)
        .ok_or(LabelTableError::OutOfRange {
          id: spec.id,
          num_classes,
        })?;
      if slot.is_some() {
        return Err(LabelTableError::DuplicateClass(spec.id));
      }
      *slot = Some((spec.label.clone(), spec.category));
    }

    let entries = slots
      .into_iter()
      .enumerate()
      .map(|(id, slot)| slot.ok_or(LabelTableError::MissingClass(id as u32)))
      .collect::<Result<Vec<_>, _>>()?;

    Ok(Self {
      entries: entries.into_boxed_slice(),
    })
  }

  /// 由名称列表构造，`primary` 决定每个类别的播报优先级
  pub fn from_names(names: &[&str], primary: impl Fn(&str) -> bool) -> Self {
    let entries = names
      .iter()
      .map(|name| {
        let category = if primary(name) {
          Category::Primary
        } else {
          Category::Generic
        };
        (name.to_string(), category)
      })
      .collect::<Vec<_>>();
    Self {
      entries: entries.into_boxed_slice(),
    }
  }

  pub fn num_classes(&self) -> usize {
    self.entries.len()
  }

  pub fn get(&self, class_id: u32) -> Option<(&str, Category)> {
    self
      .entries
      .get(class_id as usize)
      .map(|(label, category)| (label.as_str(), *category))
  }

  /// 未登记的类别返回 `Class {id}`，归为 Generic
  pub fn resolve(&self, class_id: u32) -> (String, Category) {
    match self.get(class_id) {
      Some((label, category)) => (label.to_string(), category),
      None => (format!("Class {}", class_id), Category::Generic),
    }
  }

  pub fn to_specs(&self) -> Vec<LabelSpec> {
    self
      .entries
      .iter()
      .enumerate()
      .map(|(id, (label, category))| LabelSpec {
        id: id as u32,
        label: label.clone(),
        category: *category,
      })
      .collect()
  }

  pub fn currency() -> Self {
    Self::from_names(&CURRENCY_CLASSES, |_| true)
  }

  pub fn object() -> Self {
    Self::from_names(&COCO_CLASSES, |_| true)
  }

  pub fn hurdle() -> Self {
    Self::from_names(&COCO_CLASSES, |name| HURDLE_CLASSES.contains(&name))
  }

  pub fn text() -> Self {
    Self::from_names(&["Text"], |_| true)
  }
}
