// 该文件是 LifeLens （慧眼） 项目的一部分。
// src/config.rs - 模式配置
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

use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  feedback::ArbiterTiming,
  frame::{TensorLayout, ValueRange},
  mode::DetectionMode,
  model::{LabelSpec, LabelTable, LabelTableError, Viewport},
  preprocess::InputSpec,
};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("读取配置文件失败: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置文件格式错误: {0}")]
  FormatError(#[from] serde_json::Error),
  #[error("{mode} 模式的标签表无效: {source}")]
  LabelTable {
    mode: DetectionMode,
    source: LabelTableError,
  },
  #[error("{0} 模式重复配置")]
  DuplicateMode(DetectionMode),
  #[error("Closed 不是可配置的检测模式")]
  ClosedProfile,
  #[error("无效参数: {0}")]
  InvalidValue(String),
}

/// 单个检测模式的配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeProfile {
  pub mode: DetectionMode,
  pub model: Url,
  pub input: InputSpec,
  pub num_classes: usize,
  pub labels: Vec<LabelSpec>,
  /// 覆盖全局的采样间隔
  #[serde(default)]
  pub tick_interval_ms: Option<u64>,
  #[serde(default)]
  pub confidence_threshold: Option<f32>,
}

/// 应用配置，可由 JSON 文件整体覆盖
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub tick_interval_ms: u64,
  pub confidence_threshold: f32,
  pub min_announce_interval_ms: u64,
  pub no_detection_interval_ms: u64,
  pub listener_restart_delay_ms: u64,
  /// 检测框映射到的屏幕尺寸
  pub viewport: Viewport,
  pub modes: Vec<ModeProfile>,
}

// 内置配置全部使用 onnx:// 模型，需启用 `onnx` 特性；
// 未启用时请通过 --config 改用 replay:// 等可用的模型地址。
const DEFAULT_MODEL_DIR: &str = "/opt/lifelens/models";

fn default_profile(
  mode: DetectionMode,
  file: &str,
  size: u32,
  range: ValueRange,
  labels: LabelTable,
) -> ModeProfile {
  let model = format!("onnx://{}/{}", DEFAULT_MODEL_DIR, file);
  ModeProfile {
    mode,
    model: Url::parse(&model).expect("默认模型地址无效"),
    input: InputSpec {
      width: size,
      height: size,
      layout: TensorLayout::Nchw,
      range,
    },
    num_classes: labels.num_classes(),
    labels: labels.to_specs(),
    tick_interval_ms: None,
    confidence_threshold: None,
  }
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      tick_interval_ms: 2500,
      confidence_threshold: 0.5,
      min_announce_interval_ms: 2500,
      no_detection_interval_ms: 5000,
      listener_restart_delay_ms: 500,
      viewport: Viewport {
        width: 1080.0,
        height: 1920.0,
      },
      modes: vec![
        default_profile(
          DetectionMode::Currency,
          "currency.onnx",
          640,
          ValueRange::ZeroToOne,
          LabelTable::currency(),
        ),
        default_profile(
          DetectionMode::Object,
          "object.onnx",
          640,
          ValueRange::ZeroToOne,
          LabelTable::object(),
        ),
        default_profile(
          DetectionMode::Text,
          "text.onnx",
          320,
          ValueRange::MinusOneToOne,
          LabelTable::text(),
        ),
        default_profile(
          DetectionMode::Hurdle,
          "hurdle.onnx",
          640,
          ValueRange::ZeroToOne,
          LabelTable::hurdle(),
        ),
      ],
    }
  }
}

/// 校验后的模式参数
#[derive(Debug, Clone)]
pub struct ModeSettings {
  pub mode: DetectionMode,
  pub model: Url,
  pub input: InputSpec,
  pub num_classes: usize,
  pub labels: Arc<LabelTable>,
  pub tick_interval: Duration,
  pub confidence_threshold: f32,
}

impl ModeSettings {
  /// 超过该时长的检测周期视为失败
  pub fn cycle_timeout(&self) -> Duration {
    self.tick_interval * 2
  }
}

/// 所有已配置模式
#[derive(Debug, Clone, Default)]
pub struct ModeRegistry {
  modes: HashMap<DetectionMode, Arc<ModeSettings>>,
  timing: ArbiterTiming,
  restart_delay: Duration,
  viewport: Viewport,
}

impl ModeRegistry {
  pub fn get(&self, mode: DetectionMode) -> Option<Arc<ModeSettings>> {
    self.modes.get(&mode).cloned()
  }

  pub fn timing(&self) -> ArbiterTiming {
    self.timing
  }

  pub fn restart_delay(&self) -> Duration {
    self.restart_delay
  }

  pub fn viewport(&self) -> Viewport {
    self.viewport
  }

  pub fn len(&self) -> usize {
    self.modes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.modes.is_empty()
  }
}

fn check_threshold(value: f32) -> Result<f32, ConfigError> {
  if (0.0..=1.0).contains(&value) {
    Ok(value)
  } else {
    Err(ConfigError::InvalidValue(format!(
      "置信度阈值 {} 不在 [0, 1] 内",
      value
    )))
  }
}

fn check_input(mode: DetectionMode, input: &InputSpec) -> Result<(), ConfigError> {
  if input.width == 0 || input.height == 0 {
    return Err(ConfigError::InvalidValue(format!(
      "{} 模式的输入尺寸 {}x{} 无效",
      mode, input.width, input.height
    )));
  }
  Ok(())
}

fn check_viewport(viewport: Viewport) -> Result<Viewport, ConfigError> {
  let valid = |v: f32| v.is_finite() && v > 0.0;
  if valid(viewport.width) && valid(viewport.height) {
    Ok(viewport)
  } else {
    Err(ConfigError::InvalidValue(format!(
      "屏幕尺寸 {}x{} 无效",
      viewport.width, viewport.height
    )))
  }
}

fn check_interval(name: &str, ms: u64) -> Result<Duration, ConfigError> {
  if ms == 0 {
    return Err(ConfigError::InvalidValue(format!("{} 不能为 0", name)));
  }
  Ok(Duration::from_millis(ms))
}

impl AppConfig {
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("读取配置文件: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let config = serde_json::from_str(&content)?;
    Ok(config)
  }

  /// 校验配置并构建模式表，启动时调用
  pub fn validate(&self) -> Result<ModeRegistry, ConfigError> {
    let default_tick = check_interval("tick_interval_ms", self.tick_interval_ms)?;
    let default_threshold = check_threshold(self.confidence_threshold)?;
    let timing = ArbiterTiming {
      min_interval: check_interval("min_announce_interval_ms", self.min_announce_interval_ms)?,
      no_detection_interval: check_interval(
        "no_detection_interval_ms",
        self.no_detection_interval_ms,
      )?,
    };
    let viewport = check_viewport(self.viewport)?;

    let mut modes = HashMap::new();
    for profile in &self.modes {
      if profile.mode == DetectionMode::Closed {
        return Err(ConfigError::ClosedProfile);
      }
      check_input(profile.mode, &profile.input)?;

      let labels = LabelTable::try_new(profile.num_classes, &profile.labels).map_err(|source| {
        ConfigError::LabelTable {
          mode: profile.mode,
          source,
        }
      })?;

      let tick_interval = match profile.tick_interval_ms {
        Some(ms) => check_interval("tick_interval_ms", ms)?,
        None => default_tick,
      };
      let confidence_threshold = match profile.confidence_threshold {
        Some(t) => check_threshold(t)?,
        None => default_threshold,
      };

      let settings = ModeSettings {
        mode: profile.mode,
        model: profile.model.clone(),
        input: profile.input,
        num_classes: profile.num_classes,
        labels: Arc::new(labels),
        tick_interval,
        confidence_threshold,
      };
      debug!(
        "模式 {}: 模型 {}, 类别 {}, 间隔 {:?}",
        settings.mode, settings.model, settings.num_classes, settings.tick_interval
      );

      if modes.insert(profile.mode, Arc::new(settings)).is_some() {
        return Err(ConfigError::DuplicateMode(profile.mode));
      }
    }

    Ok(ModeRegistry {
      modes,
      timing,
      restart_delay: Duration::from_millis(self.listener_restart_delay_ms),
      viewport,
    })
  }
}
