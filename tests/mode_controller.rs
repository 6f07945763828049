// 该文件是 LifeLens （慧眼） 项目的一部分。
// tests/mode_controller.rs - 模式切换集成测试
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

mod common;

use std::{
  sync::{Arc, Mutex, atomic::Ordering},
  time::Duration,
};

use async_trait::async_trait;
use tokio::{sync::mpsc, time::sleep};
use tokio_util::sync::CancellationToken;

use common::{Call, DenyingCamera, FakeLoader, RecordingSpeaker, registry, still_camera};
use lifelens::{
  feedback::NO_DETECTION_TEXT,
  output::{SpeechDispatcher, SpeechEngine},
  mode::{
    CAMERA_PERMISSION_TEXT, CLOSING_TEXT, Command, DetectionMode, ModeController, ModeError,
    ModeInput, REPROMPT_TEXT,
  },
  voice::VoiceCommand,
};

fn controller(loader: Arc<FakeLoader>, speaker: Arc<RecordingSpeaker>) -> ModeController {
  ModeController::new(registry(), still_camera(), loader, speaker)
}

#[tokio::test(start_paused = true)]
async fn test_switch_releases_previous_session_first() {
  // 推理比采样间隔慢，保证切换时有周期在执行
  let loader = Arc::new(FakeLoader::new(Duration::from_millis(1500)));
  let speaker = Arc::new(RecordingSpeaker::default());
  let mut controller = controller(loader.clone(), speaker.clone());

  let mode = controller.apply(Command::Open(DetectionMode::Currency)).await.unwrap();
  assert_eq!(mode, DetectionMode::Currency);
  sleep(Duration::from_millis(5200)).await;
  assert!(controller.scheduler().unwrap().is_busy());

  controller.apply(Command::Open(DetectionMode::Object)).await.unwrap();
  sleep(Duration::from_millis(6000)).await;
  assert_eq!(controller.state(), DetectionMode::Object);

  let calls = loader.calls();
  let released = calls
    .iter()
    .position(|c| *c == Call::Release(DetectionMode::Currency))
    .unwrap();
  let loaded = calls
    .iter()
    .position(|c| *c == Call::Load(DetectionMode::Object))
    .unwrap();
  assert!(released < loaded);
  assert!(
    !calls[released..].contains(&Call::Run(DetectionMode::Currency)),
    "calls: {:?}",
    calls
  );
  assert!(calls[loaded..].contains(&Call::Run(DetectionMode::Object)));
  assert_eq!(loader.max_running.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_currency_detection_is_announced() {
  let loader = Arc::new(
    FakeLoader::new(Duration::from_millis(10)).with_output(
      DetectionMode::Currency,
      common::single_anchor_output(7, 0.9, 2),
    ),
  );
  let speaker = Arc::new(RecordingSpeaker::default());
  let mut controller = controller(loader.clone(), speaker.clone());

  controller.apply(Command::Open(DetectionMode::Currency)).await.unwrap();
  sleep(Duration::from_millis(100)).await;
  assert_eq!(speaker.spoken(), vec!["Opening currency mode"]);

  sleep(Duration::from_millis(1000)).await;
  assert_eq!(
    speaker.spoken(),
    vec!["Opening currency mode", "50 Rupees, 90 percent"]
  );

  // 2000ms 和 3000ms 的周期都在最小播报间隔内
  sleep(Duration::from_millis(2300)).await;
  assert_eq!(speaker.spoken().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_model_load_failure_reverts_to_closed() {
  let loader = Arc::new(FakeLoader::new(Duration::from_millis(10)).failing(DetectionMode::Text));
  let speaker = Arc::new(RecordingSpeaker::default());
  let mut controller = controller(loader.clone(), speaker.clone());

  controller.apply(Command::Open(DetectionMode::Currency)).await.unwrap();
  let err = controller
    .apply(Command::Open(DetectionMode::Text))
    .await
    .unwrap_err();
  assert!(matches!(err, ModeError::ModelLoad(_)));
  assert_eq!(controller.state(), DetectionMode::Closed);
  assert!(controller.scheduler().is_none());
  assert_eq!(speaker.last().unwrap(), "Could not load the text model");
  assert!(loader.calls().contains(&Call::Release(DetectionMode::Currency)));

  let mode = controller.apply(Command::Open(DetectionMode::Currency)).await.unwrap();
  assert_eq!(mode, DetectionMode::Currency);
}

#[tokio::test(start_paused = true)]
async fn test_touch_and_voice_are_equivalent() {
  let mut outcomes = Vec::new();
  for input in [
    ModeInput::Touch(DetectionMode::Hurdle),
    ModeInput::Voice(VoiceCommand::new("char")),
  ] {
    let loader = Arc::new(FakeLoader::new(Duration::from_millis(10)));
    let speaker = Arc::new(RecordingSpeaker::default());
    let mut controller = controller(loader.clone(), speaker.clone());

    let mode = controller.apply(input.into_command()).await.unwrap();
    sleep(Duration::from_millis(1100)).await;
    outcomes.push((mode, speaker.spoken(), loader.calls()));
  }

  assert_eq!(outcomes[0], outcomes[1]);
  assert_eq!(outcomes[0].0, DetectionMode::Hurdle);
  assert_eq!(
    outcomes[0].1,
    vec!["Opening hurdle mode".to_string(), NO_DETECTION_TEXT.to_string()]
  );
}

#[tokio::test(start_paused = true)]
async fn test_camera_permission_prompted_once() {
  let loader = Arc::new(FakeLoader::new(Duration::from_millis(10)));
  let speaker = Arc::new(RecordingSpeaker::default());
  let camera = Arc::new(DenyingCamera::default());
  let mut controller = ModeController::new(registry(), camera.clone(), loader.clone(), speaker.clone());

  for _ in 0..2 {
    let err = controller
      .apply(Command::Open(DetectionMode::Object))
      .await
      .unwrap_err();
    assert!(matches!(err, ModeError::PermissionDenied));
    assert_eq!(controller.state(), DetectionMode::Closed);
  }
  let prompts = speaker
    .spoken()
    .iter()
    .filter(|t| *t == CAMERA_PERMISSION_TEXT)
    .count();
  assert_eq!(prompts, 1);
  assert!(loader.calls().is_empty());

  camera.grant();
  let mode = controller.apply(Command::Open(DetectionMode::Object)).await.unwrap();
  assert_eq!(mode, DetectionMode::Object);
}

#[tokio::test(start_paused = true)]
async fn test_unrecognized_command_keeps_mode() {
  let loader = Arc::new(FakeLoader::new(Duration::from_millis(10)));
  let speaker = Arc::new(RecordingSpeaker::default());
  let mut controller = controller(loader.clone(), speaker.clone());

  controller.apply(Command::Open(DetectionMode::Object)).await.unwrap();
  sleep(Duration::from_millis(100)).await;

  let command = VoiceCommand::new("xyz").command();
  assert_eq!(controller.apply(command).await.unwrap(), DetectionMode::Object);
  assert_eq!(speaker.last().unwrap(), REPROMPT_TEXT);

  let spoken = speaker.spoken().len();
  let command = VoiceCommand::new("  ").command();
  assert_eq!(controller.apply(command).await.unwrap(), DetectionMode::Object);
  assert_eq!(speaker.spoken().len(), spoken);

  assert_eq!(controller.apply(Command::Close).await.unwrap(), DetectionMode::Closed);
  assert_eq!(speaker.last().unwrap(), CLOSING_TEXT);
  assert_eq!(loader.calls().last(), Some(&Call::Release(DetectionMode::Object)));
}

#[tokio::test(start_paused = true)]
async fn test_run_closes_mode_on_cancel() {
  let loader = Arc::new(FakeLoader::new(Duration::from_millis(10)));
  let speaker = Arc::new(RecordingSpeaker::default());
  let controller = controller(loader.clone(), speaker.clone());

  let (tx, rx) = mpsc::channel(4);
  let cancel = CancellationToken::new();
  let task = tokio::spawn(controller.run(rx, cancel.clone()));

  tx.send(ModeInput::Touch(DetectionMode::Currency)).await.unwrap();
  tx.send(ModeInput::Voice(VoiceCommand::new("Two."))).await.unwrap();
  // 发送端关闭后仍保持当前模式
  drop(tx);
  sleep(Duration::from_millis(3000)).await;
  assert_eq!(loader.calls().last(), Some(&Call::Run(DetectionMode::Object)));

  cancel.cancel();
  task.await.unwrap();
  assert_eq!(loader.calls().last(), Some(&Call::Release(DetectionMode::Object)));
  assert!(speaker.spoken().contains(&"Opening object mode".to_string()));
}

/// 按文本长度播放，只记录完整播完的语句
#[derive(Default)]
struct TimedEngine {
  finished: Mutex<Vec<String>>,
}

#[async_trait]
impl SpeechEngine for TimedEngine {
  async fn say(&self, text: &str) {
    sleep(Duration::from_millis(40 * text.len() as u64)).await;
    self.finished.lock().unwrap().push(text.to_string());
  }
}

#[tokio::test(start_paused = true)]
async fn test_mode_confirmation_is_not_cut_off() {
  let loader = Arc::new(FakeLoader::new(Duration::from_millis(50)));
  let engine = Arc::new(TimedEngine::default());
  let speaker = Arc::new(SpeechDispatcher::new(engine.clone()));
  let mut controller = ModeController::new(registry(), still_camera(), loader.clone(), speaker);

  controller.apply(Command::Open(DetectionMode::Object)).await.unwrap();
  sleep(Duration::from_millis(4000)).await;

  let finished = engine.finished.lock().unwrap().clone();
  assert_eq!(finished.first().map(String::as_str), Some("Opening object mode"));
  assert!(finished.contains(&NO_DETECTION_TEXT.to_string()));
}
