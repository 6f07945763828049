// 该文件是 LifeLens （慧眼） 项目的一部分。
// src/task.rs - 周期性检测任务
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

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
  },
  time::Duration,
};

use thiserror::Error;
use tokio::{
  sync::Mutex,
  task::JoinHandle,
  time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
  config::ModeSettings,
  feedback::{Action, ArbiterTiming, FeedbackArbiter},
  input::{Camera, CameraError},
  mode::DetectionMode,
  model::{BoundingBox, DecodeError, Detection, ModelError, Session, Viewport, decode},
  output::Speaker,
  preprocess::{PreprocessError, preprocess},
};

/// 单个检测周期内的错误，均为可恢复错误，下个周期自动重试
#[derive(Error, Debug)]
pub enum CycleError {
  #[error("采集失败: {0}")]
  Camera(#[from] CameraError),
  #[error("预处理失败: {0}")]
  Preprocess(#[from] PreprocessError),
  #[error("推理失败: {0}")]
  Inference(#[from] ModelError),
  #[error("解码失败: {0}")]
  Decode(#[from] DecodeError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
  Announced(String),
  Silent,
  /// 调度器已取消，结果被丢弃
  Discarded,
}

/// 采集 → 预处理 → 推理 → 解码 → 仲裁 → 播报
pub struct DetectionPipeline {
  settings: Arc<ModeSettings>,
  camera: Arc<dyn Camera>,
  session: Arc<dyn Session>,
  speaker: Arc<dyn Speaker>,
  arbiter: Mutex<FeedbackArbiter>,
  viewport: Viewport,
}

impl DetectionPipeline {
  /// 每个模式会话都持有全新的播报状态
  pub fn new(
    settings: Arc<ModeSettings>,
    camera: Arc<dyn Camera>,
    session: Arc<dyn Session>,
    speaker: Arc<dyn Speaker>,
    timing: ArbiterTiming,
  ) -> Self {
    Self {
      settings,
      camera,
      session,
      speaker,
      arbiter: Mutex::new(FeedbackArbiter::new(timing)),
      viewport: Viewport {
        width: 1.0,
        height: 1.0,
      },
    }
  }

  pub fn with_viewport(mut self, viewport: Viewport) -> Self {
    self.viewport = viewport;
    self
  }

  pub fn mode(&self) -> DetectionMode {
    self.settings.mode
  }

  /// 检测框的屏幕坐标
  pub fn screen_boxes(&self, detections: &[Detection]) -> Vec<BoundingBox> {
    detections
      .iter()
      .map(|d| d.bbox.scale(self.viewport))
      .collect()
  }

  pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleOutcome, CycleError> {
    let frame = self.camera.acquire_frame().await?;
    debug!(
      "采集到 {}x{} 帧 ({})",
      frame.width(),
      frame.height(),
      frame.captured_at().format("%H:%M:%S%.3f")
    );

    let tensor = preprocess(&frame, &self.settings.input)?;
    drop(frame);

    let started = Instant::now();
    let raw = self.session.run(tensor).await?;
    debug!("推理完成，耗时: {:.2?}", started.elapsed());

    let detections = decode(
      &raw,
      self.settings.num_classes,
      self.settings.confidence_threshold,
      &self.settings.labels,
    )?;
    for (det, bbox) in detections.iter().zip(self.screen_boxes(&detections)) {
      debug!(
        "  - {}: {:.2}% at ({:.0}, {:.0}, {:.0}x{:.0})",
        det.label,
        det.confidence * 100.0,
        bbox.x,
        bbox.y,
        bbox.width,
        bbox.height
      );
    }

    if cancel.is_cancelled() {
      debug!("调度器已取消，丢弃本周期结果");
      return Ok(CycleOutcome::Discarded);
    }

    let action = self
      .arbiter
      .lock()
      .await
      .arbitrate(&detections, Instant::now());
    match action {
      Action::Speak(text) => {
        self.speaker.speak(&text);
        Ok(CycleOutcome::Announced(text))
      }
      Action::NoAction => Ok(CycleOutcome::Silent),
    }
  }
}

/// 调度统计
#[derive(Debug, Default)]
pub struct SchedulerStats {
  pub ticks: AtomicU64,
  pub skipped: AtomicU64,
  pub completed: AtomicU64,
  pub failed: AtomicU64,
  pub timed_out: AtomicU64,
}

impl SchedulerStats {
  pub fn get(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
  }

  fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }
}

/// 周期性驱动检测流水线，同一时刻最多一个周期在执行
///
/// 第一个节拍在启动后一个间隔到来。忙碌时到来的节拍直接丢弃，不排队也不补帧。
pub struct FrameScheduler {
  pipeline: Arc<DetectionPipeline>,
  tick: Duration,
  timeout: Duration,
}

impl FrameScheduler {
  pub fn new(pipeline: Arc<DetectionPipeline>, tick: Duration) -> Self {
    Self {
      pipeline,
      tick,
      timeout: tick * 2,
    }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn start(self) -> SchedulerHandle {
    let cancel = CancellationToken::new();
    let busy = Arc::new(AtomicBool::new(false));
    let stats = Arc::new(SchedulerStats::default());

    info!(
      "启动 {} 模式调度器, 间隔 {:?}, 超时 {:?}",
      self.pipeline.mode(),
      self.tick,
      self.timeout
    );
    let driver = tokio::spawn(drive(
      self.pipeline,
      self.tick,
      self.timeout,
      busy.clone(),
      stats.clone(),
      cancel.clone(),
    ));

    SchedulerHandle {
      cancel,
      driver: Some(driver),
      busy,
      stats,
    }
  }
}

async fn drive(
  pipeline: Arc<DetectionPipeline>,
  tick: Duration,
  timeout: Duration,
  busy: Arc<AtomicBool>,
  stats: Arc<SchedulerStats>,
  cancel: CancellationToken,
) {
  // 首个周期推迟一个间隔，给打开模式的确认播报留出时间
  let mut interval = tokio::time::interval_at(Instant::now() + tick, tick);
  interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
  let mut in_flight: Option<JoinHandle<()>> = None;

  loop {
    tokio::select! {
      biased;
      _ = cancel.cancelled() => break,
      _ = interval.tick() => {}
    }
    SchedulerStats::bump(&stats.ticks);

    if busy
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      debug!("上一个周期仍在执行，跳过本次节拍");
      SchedulerStats::bump(&stats.skipped);
      continue;
    }

    let pipeline = pipeline.clone();
    let busy = busy.clone();
    let stats = stats.clone();
    let cancel = cancel.clone();
    in_flight = Some(tokio::spawn(async move {
      match tokio::time::timeout(timeout, pipeline.run_cycle(&cancel)).await {
        Ok(Ok(outcome)) => {
          debug!("周期完成: {:?}", outcome);
          SchedulerStats::bump(&stats.completed);
        }
        Ok(Err(e)) => {
          warn!("检测周期失败，等待下次节拍: {}", e);
          SchedulerStats::bump(&stats.failed);
        }
        Err(_) => {
          warn!("检测周期超时 ({:?})，已放弃", timeout);
          SchedulerStats::bump(&stats.timed_out);
        }
      }
      busy.store(false, Ordering::Release);
    }));
  }

  if let Some(cycle) = in_flight.take() {
    cycle.abort();
    if let Err(e) = cycle.await {
      if !e.is_cancelled() {
        error!("检测周期异常退出: {}", e);
      }
    }
  }
  busy.store(false, Ordering::Release);
  debug!("{} 模式调度器已停止", pipeline.mode());
}

/// 调度器的取消句柄，丢弃时同样会停止计时器
pub struct SchedulerHandle {
  cancel: CancellationToken,
  driver: Option<JoinHandle<()>>,
  busy: Arc<AtomicBool>,
  stats: Arc<SchedulerStats>,
}

impl SchedulerHandle {
  pub fn is_busy(&self) -> bool {
    self.busy.load(Ordering::Acquire)
  }

  pub fn stats(&self) -> &SchedulerStats {
    &self.stats
  }

  /// 停止计时器并中止进行中的周期，返回后该调度器不会再访问会话
  pub async fn shutdown(mut self) {
    self.cancel.cancel();
    if let Some(driver) = self.driver.take() {
      if let Err(e) = driver.await {
        error!("调度器任务异常退出: {}", e);
      }
    }
  }
}

impl Drop for SchedulerHandle {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}
