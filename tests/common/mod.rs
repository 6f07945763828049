// 该文件是 LifeLens （慧眼） 项目的一部分。
// tests/common/mod.rs - 集成测试用的假能力
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

#![allow(dead_code)]

use std::{
  collections::HashSet,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use url::Url;

use lifelens::{
  config::{AppConfig, ModeRegistry},
  frame::{CapturedFrame, RawOutput, Tensor},
  input::{Camera, CameraError, StillCamera},
  mode::DetectionMode,
  model::{ModelError, ModelLoader, Session},
  output::Speaker,
};

/// 测试用的采样间隔
pub const TICK: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
  Load(DetectionMode),
  Run(DetectionMode),
  Release(DetectionMode),
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

/// 所有模型地址都是 `replay:///<mode>`，输入缩小到 8x8
pub fn registry() -> Arc<ModeRegistry> {
  let mut config = AppConfig {
    tick_interval_ms: TICK.as_millis() as u64,
    ..AppConfig::default()
  };
  for profile in &mut config.modes {
    profile.model = Url::parse(&format!("replay:///{}", profile.mode)).unwrap();
    profile.input.width = 8;
    profile.input.height = 8;
  }
  Arc::new(config.validate().unwrap())
}

pub fn still_camera() -> Arc<dyn Camera> {
  Arc::new(StillCamera::new(CapturedFrame::new(vec![200; 4 * 4 * 3], 4, 4)))
}

/// 没有任何锚点的输出
pub fn empty_output(num_classes: usize) -> RawOutput {
  RawOutput::single(vec![1, num_classes + 5, 0], Vec::new())
}

/// 单个锚点的输出，`class_id` 得分最高
pub fn single_anchor_output(num_classes: usize, confidence: f32, class_id: usize) -> RawOutput {
  let mut data = vec![0.5, 0.5, 0.2, 0.2, confidence];
  data.extend((0..num_classes).map(|c| if c == class_id { 0.8 } else { 0.1 }));
  RawOutput::single(vec![1, num_classes + 5, 1], data)
}

#[derive(Default)]
pub struct RecordingSpeaker {
  spoken: Mutex<Vec<String>>,
}

impl RecordingSpeaker {
  pub fn spoken(&self) -> Vec<String> {
    self.spoken.lock().unwrap().clone()
  }

  pub fn last(&self) -> Option<String> {
    self.spoken.lock().unwrap().last().cloned()
  }
}

impl Speaker for RecordingSpeaker {
  fn speak(&self, text: &str) {
    self.spoken.lock().unwrap().push(text.to_string());
  }

  fn cancel(&self) {}
}

/// 记录调用并统计并发推理数的会话
pub struct TaggedSession {
  mode: DetectionMode,
  output: RawOutput,
  latency: Duration,
  log: CallLog,
  released: AtomicBool,
  running: AtomicUsize,
  max_running: Arc<AtomicUsize>,
}

#[async_trait]
impl Session for TaggedSession {
  async fn run(&self, _input: Tensor) -> Result<RawOutput, ModelError> {
    if self.released.load(Ordering::SeqCst) {
      return Err(ModelError::Released);
    }
    self.log.lock().unwrap().push(Call::Run(self.mode));
    let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_running.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(self.latency).await;
    self.running.fetch_sub(1, Ordering::SeqCst);
    Ok(self.output.clone())
  }

  async fn release(&self) {
    self.released.store(true, Ordering::SeqCst);
    self.log.lock().unwrap().push(Call::Release(self.mode));
  }
}

/// 按地址中的模式名创建 [`TaggedSession`]
pub struct FakeLoader {
  pub log: CallLog,
  pub latency: Duration,
  pub failing: HashSet<DetectionMode>,
  pub outputs: Vec<(DetectionMode, RawOutput)>,
  /// 单个会话内的最大并发推理数
  pub max_running: Arc<AtomicUsize>,
}

impl FakeLoader {
  pub fn new(latency: Duration) -> Self {
    Self {
      log: Arc::default(),
      latency,
      failing: HashSet::new(),
      outputs: Vec::new(),
      max_running: Arc::default(),
    }
  }

  pub fn failing(mut self, mode: DetectionMode) -> Self {
    self.failing.insert(mode);
    self
  }

  pub fn with_output(mut self, mode: DetectionMode, output: RawOutput) -> Self {
    self.outputs.push((mode, output));
    self
  }

  pub fn calls(&self) -> Vec<Call> {
    self.log.lock().unwrap().clone()
  }
}

#[async_trait]
impl ModelLoader for FakeLoader {
  async fn load(&self, model: &Url) -> Result<Arc<dyn Session>, ModelError> {
    let mode: DetectionMode = model
      .path()
      .trim_start_matches('/')
      .parse()
      .map_err(|e| ModelError::ModelLoadError(format!("{}", e)))?;
    if self.failing.contains(&mode) {
      return Err(ModelError::ModelLoadError(format!("{} 模型损坏", mode)));
    }
    self.log.lock().unwrap().push(Call::Load(mode));

    let num_classes = registry().get(mode).unwrap().num_classes;
    let output = self
      .outputs
      .iter()
      .find(|(m, _)| *m == mode)
      .map(|(_, o)| o.clone())
      .unwrap_or_else(|| empty_output(num_classes));

    Ok(Arc::new(TaggedSession {
      mode,
      output,
      latency: self.latency,
      log: self.log.clone(),
      released: AtomicBool::new(false),
      running: AtomicUsize::new(0),
      max_running: self.max_running.clone(),
    }))
  }
}

/// 总是拒绝权限，直到 `grant` 被调用
#[derive(Default)]
pub struct DenyingCamera {
  granted: AtomicBool,
}

impl DenyingCamera {
  pub fn grant(&self) {
    self.granted.store(true, Ordering::SeqCst);
  }
}

#[async_trait]
impl Camera for DenyingCamera {
  async fn request_permission(&self) -> Result<(), CameraError> {
    if self.granted.load(Ordering::SeqCst) {
      Ok(())
    } else {
      Err(CameraError::PermissionDenied)
    }
  }

  async fn acquire_frame(&self) -> Result<CapturedFrame, CameraError> {
    Ok(CapturedFrame::new(vec![0; 2 * 2 * 3], 2, 2))
  }
}
