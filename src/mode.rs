// 该文件是 LifeLens （慧眼） 项目的一部分。
// src/mode.rs - 检测模式状态机
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

use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
  config::ModeRegistry,
  input::{Camera, CameraError},
  model::{ModelError, ModelLoader, Session},
  output::Speaker,
  task::{DetectionPipeline, FrameScheduler, SchedulerHandle},
  voice::VoiceCommand,
};

pub const CLOSING_TEXT: &str = "Closing camera";
pub const REPROMPT_TEXT: &str = "Please say one, two, three, or four.";
pub const CAMERA_PERMISSION_TEXT: &str = "Camera permission is required";

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
  #[default]
  Closed,
  Currency,
  Object,
  Text,
  Hurdle,
}

impl DetectionMode {
  /// 可以打开的四种检测模式，按编号排列
  pub const DETECTING: [DetectionMode; 4] = [
    DetectionMode::Currency,
    DetectionMode::Object,
    DetectionMode::Text,
    DetectionMode::Hurdle,
  ];

  /// 编号 1-4 对应的检测模式
  pub fn from_selector(selector: u8) -> Option<Self> {
    match selector {
      1..=4 => Some(Self::DETECTING[selector as usize - 1]),
      _ => None,
    }
  }

  pub fn selector(&self) -> Option<u8> {
    Self::DETECTING
      .iter()
      .position(|m| m == self)
      .map(|i| i as u8 + 1)
  }

  pub fn name(&self) -> &'static str {
    match self {
      DetectionMode::Closed => "closed",
      DetectionMode::Currency => "currency",
      DetectionMode::Object => "object",
      DetectionMode::Text => "text",
      DetectionMode::Hurdle => "hurdle",
    }
  }

  pub fn is_closed(&self) -> bool {
    *self == DetectionMode::Closed
  }
}

impl fmt::Display for DetectionMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("未知的检测模式: {0}")]
pub struct ParseModeError(String);

impl FromStr for DetectionMode {
  type Err = ParseModeError;

  /// 接受模式名或编号
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim().to_lowercase();
    if let Ok(selector) = s.parse::<u8>() {
      return Self::from_selector(selector).ok_or(ParseModeError(s));
    }
    [DetectionMode::Closed]
      .into_iter()
      .chain(Self::DETECTING)
      .find(|m| m.name() == s)
      .ok_or(ParseModeError(s))
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
  Open(DetectionMode),
  Close,
  Unrecognized { raw: String },
}

/// 纯状态转移，副作用由 [`ModeController`] 负责
pub fn transition(state: DetectionMode, command: &Command) -> DetectionMode {
  match command {
    Command::Open(mode) => *mode,
    Command::Close => DetectionMode::Closed,
    Command::Unrecognized { .. } => state,
  }
}

/// 触摸与语音两种输入，最终都归约为 [`Command`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeInput {
  Touch(DetectionMode),
  Voice(VoiceCommand),
}

impl ModeInput {
  pub fn into_command(self) -> Command {
    match self {
      ModeInput::Touch(DetectionMode::Closed) => Command::Close,
      ModeInput::Touch(mode) => Command::Open(mode),
      ModeInput::Voice(voice) => voice.command(),
    }
  }
}

#[derive(Error, Debug)]
pub enum ModeError {
  #[error("摄像头权限被拒绝")]
  PermissionDenied,
  #[error("摄像头错误: {0}")]
  Camera(#[from] CameraError),
  #[error("模型加载失败: {0}")]
  ModelLoad(#[from] ModelError),
  #[error("{0} 模式未配置")]
  NotConfigured(DetectionMode),
}

struct ActiveSession {
  mode: DetectionMode,
  session: Arc<dyn Session>,
  scheduler: SchedulerHandle,
}

/// 持有当前模式及其推理会话与调度器
pub struct ModeController {
  state: DetectionMode,
  active: Option<ActiveSession>,
  registry: Arc<ModeRegistry>,
  camera: Arc<dyn Camera>,
  loader: Arc<dyn ModelLoader>,
  speaker: Arc<dyn Speaker>,
  permission_prompted: bool,
}

impl ModeController {
  pub fn new(
    registry: Arc<ModeRegistry>,
    camera: Arc<dyn Camera>,
    loader: Arc<dyn ModelLoader>,
    speaker: Arc<dyn Speaker>,
  ) -> Self {
    Self {
      state: DetectionMode::Closed,
      active: None,
      registry,
      camera,
      loader,
      speaker,
      permission_prompted: false,
    }
  }

  pub fn state(&self) -> DetectionMode {
    self.state
  }

  /// 当前模式的调度器，关闭状态下为 `None`
  pub fn scheduler(&self) -> Option<&SchedulerHandle> {
    self.active.as_ref().map(|a| &a.scheduler)
  }

  /// 执行命令并播报确认，返回新的模式
  ///
  /// 打开失败时模式回到 `Closed` 并返回错误，下一次打开会重新加载。
  pub async fn apply(&mut self, command: Command) -> Result<DetectionMode, ModeError> {
    let next = transition(self.state, &command);
    match command {
      Command::Unrecognized { raw } => {
        if !raw.trim().is_empty() {
          info!("未识别的命令: {:?}", raw);
          self.speaker.speak(REPROMPT_TEXT);
        }
      }
      Command::Close | Command::Open(DetectionMode::Closed) => {
        self.teardown().await;
        self.speaker.speak(CLOSING_TEXT);
      }
      Command::Open(mode) => {
        self.teardown().await;
        self.speaker.speak(&format!("Opening {} mode", mode));
        if let Err(e) = self.activate(mode).await {
          warn!("打开 {} 模式失败: {}", mode, e);
          match &e {
            ModeError::PermissionDenied => {}
            ModeError::NotConfigured(_) => {
              self.speaker.speak(&format!("{} mode is not available", mode));
            }
            _ => self
              .speaker
              .speak(&format!("Could not load the {} model", mode)),
          }
          return Err(e);
        }
      }
    }
    debug_assert_eq!(self.state, next);
    Ok(self.state)
  }

  async fn activate(&mut self, mode: DetectionMode) -> Result<(), ModeError> {
    let settings = self
      .registry
      .get(mode)
      .ok_or(ModeError::NotConfigured(mode))?;

    match self.camera.request_permission().await {
      Ok(()) => self.permission_prompted = false,
      Err(CameraError::PermissionDenied) => {
        if !self.permission_prompted {
          self.speaker.speak(CAMERA_PERMISSION_TEXT);
          self.permission_prompted = true;
        }
        return Err(ModeError::PermissionDenied);
      }
      Err(e) => return Err(e.into()),
    }

    info!("加载 {} 模式模型: {}", mode, settings.model);
    let session = self.loader.load(&settings.model).await?;

    let pipeline = Arc::new(DetectionPipeline::new(
      settings.clone(),
      self.camera.clone(),
      session.clone(),
      self.speaker.clone(),
      self.registry.timing(),
    )
    .with_viewport(self.registry.viewport()));
    let scheduler = FrameScheduler::new(pipeline, settings.tick_interval)
      .with_timeout(settings.cycle_timeout())
      .start();

    self.active = Some(ActiveSession {
      mode,
      session,
      scheduler,
    });
    self.state = mode;
    Ok(())
  }

  /// 先停调度器再释放会话，返回后旧会话不会再被调用
  async fn teardown(&mut self) {
    if let Some(active) = self.active.take() {
      info!("关闭 {} 模式", active.mode);
      active.scheduler.shutdown().await;
      active.session.release().await;
    }
    self.state = DetectionMode::Closed;
  }

  /// 处理输入直到取消，退出前关闭当前模式
  pub async fn run(mut self, mut inputs: mpsc::Receiver<ModeInput>, cancel: CancellationToken) {
    let mut inputs_open = true;
    loop {
      let input = tokio::select! {
        biased;
        _ = cancel.cancelled() => break,
        input = inputs.recv(), if inputs_open => input,
      };
      let Some(input) = input else {
        debug!("输入通道已关闭，保持当前模式直到退出");
        inputs_open = false;
        continue;
      };

      let command = input.into_command();
      debug!("收到命令: {:?}", command);
      if let Err(e) = self.apply(command).await {
        warn!("命令执行失败: {}", e);
      }
    }

    self.teardown().await;
    info!("模式控制器已停止");
  }
}
