// 该文件是 LifeLens （慧眼） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::{sync::Arc, thread, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lifelens::{
  FromUrl,
  config::AppConfig,
  input::Camera,
  mode::{ModeController, ModeInput},
  model::SchemeModelLoader,
  output::{ConsoleSpeechEngine, SpeechDispatcher, Speaker},
  voice::{StdinRecognizer, VoiceListener},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = args::Args::parse();

  let runtime = tokio::runtime::Runtime::new().context("创建运行时失败")?;
  let result = runtime.block_on(run(args));
  // 标准输入的读取可能一直阻塞，不等待它结束
  runtime.shutdown_timeout(Duration::from_millis(500));
  result
}

async fn run(args: args::Args) -> Result<()> {
  info!("摄像头: {}", args.camera);

  let mut config = match &args.config {
    Some(path) => AppConfig::load(path)?,
    None => AppConfig::default(),
  };
  if let Some(ms) = args.tick_ms {
    config.tick_interval_ms = ms;
  }
  if let Some(threshold) = args.confidence {
    config.confidence_threshold = threshold;
  }
  let registry = Arc::new(config.validate().context("配置校验失败")?);
  info!("已配置 {} 个检测模式", registry.len());

  let camera = <Arc<dyn Camera>>::from_url(&args.camera)?;
  let speaker: Arc<dyn Speaker> = Arc::new(SpeechDispatcher::new(Arc::new(ConsoleSpeechEngine)));

  let cancel = CancellationToken::new();
  install_interrupt_handler(cancel.clone())?;

  let (tx, rx) = mpsc::channel(8);
  let controller = ModeController::new(
    registry.clone(),
    camera,
    Arc::new(SchemeModelLoader),
    speaker.clone(),
  );
  let controller = tokio::spawn(controller.run(rx, cancel.clone()));

  if let Some(mode) = args.open {
    tx.send(ModeInput::Touch(mode)).await?;
  }

  let listener = if args.no_voice {
    info!("语音控制已关闭");
    None
  } else {
    let listener = VoiceListener::new(
      Arc::new(StdinRecognizer::new()),
      speaker.clone(),
      tx.clone(),
      registry.restart_delay(),
    );
    Some(tokio::spawn(listener.run(cancel.clone())))
  };
  drop(tx);

  controller.await?;
  if let Some(listener) = listener {
    listener.await?;
  }
  speaker.cancel();

  info!("已退出");
  Ok(())
}

fn install_interrupt_handler(cancel: CancellationToken) -> Result<()> {
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    cancel.cancel();
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
  .context("设置 Ctrl-C 处理器失败")?;
  Ok(())
}
