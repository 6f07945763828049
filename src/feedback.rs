// 该文件是 LifeLens （慧眼） 项目的一部分。
// src/feedback.rs - 播报仲裁
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

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::model::{Category, Detection};

pub const NO_DETECTION_TEXT: &str = "No detection";
pub const GENERIC_DETECTION_TEXT: &str = "Object detected";

/// 仲裁结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
  Speak(String),
  NoAction,
}

/// 单次模式会话内的播报状态，每次打开模式时重置
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnouncementState {
  pub last_spoken_at: Option<Instant>,
  pub last_announced_category: Option<Category>,
}

impl AnnouncementState {
  /// 距上次播报的时长，从未播报过时为 `None`
  fn since_last(&self, now: Instant) -> Option<Duration> {
    self
      .last_spoken_at
      .map(|at| now.saturating_duration_since(at))
  }
}

/// 播报节奏参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArbiterTiming {
  /// 两次播报的最小间隔
  pub min_interval: Duration,
  /// 持续无检测时重复提示的间隔
  pub no_detection_interval: Duration,
}

impl Default for ArbiterTiming {
  fn default() -> Self {
    Self {
      min_interval: Duration::from_millis(2500),
      no_detection_interval: Duration::from_millis(5000),
    }
  }
}

/// 决定是否播报以及播报内容
pub fn arbitrate(
  detections: &[Detection],
  state: &mut AnnouncementState,
  now: Instant,
  timing: &ArbiterTiming,
) -> Action {
  let since_last = state.since_last(now);

  if since_last.is_some_and(|elapsed| elapsed < timing.min_interval) {
    return Action::NoAction;
  }

  if detections.is_empty() {
    let due = since_last.is_none_or(|elapsed| elapsed > timing.no_detection_interval);
    if !due {
      return Action::NoAction;
    }
    state.last_spoken_at = Some(now);
    return Action::Speak(NO_DETECTION_TEXT.to_string());
  }

  let mut ranked: Vec<&Detection> = detections.iter().collect();
  ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  let (text, category) = match ranked.iter().find(|d| d.category == Category::Primary) {
    Some(top) => (
      format!("{}, {} percent", top.label, (top.confidence * 100.0).round() as u32),
      Category::Primary,
    ),
    None => (GENERIC_DETECTION_TEXT.to_string(), Category::Generic),
  };

  debug!("播报 {:?} 类检测结果: {}", category, text);
  state.last_spoken_at = Some(now);
  state.last_announced_category = Some(category);
  Action::Speak(text)
}

/// 绑定了节奏参数与会话状态的仲裁器
#[derive(Debug, Clone, Default)]
pub struct FeedbackArbiter {
  timing: ArbiterTiming,
  state: AnnouncementState,
}

impl FeedbackArbiter {
  pub fn new(timing: ArbiterTiming) -> Self {
    Self {
      timing,
      state: AnnouncementState::default(),
    }
  }

  pub fn arbitrate(&mut self, detections: &[Detection], now: Instant) -> Action {
    arbitrate(detections, &mut self.state, now, &self.timing)
  }

  pub fn state(&self) -> &AnnouncementState {
    &self.state
  }

  pub fn reset(&mut self) {
    self.state = AnnouncementState::default();
  }
}
