// 该文件是 LifeLens （慧眼） 项目的一部分。
// src/output.rs - 语音输出
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

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::debug;

mod console;
pub use self::console::ConsoleSpeechEngine;

/// 语音播报能力，调用立即返回，不阻塞检测循环
pub trait Speaker: Send + Sync {
  fn speak(&self, text: &str);
  fn cancel(&self);
}

/// 一次只能播放一段语音的 TTS 引擎
#[async_trait]
pub trait SpeechEngine: Send + Sync + 'static {
  /// 播放直到结束；future 被丢弃即视为打断
  async fn say(&self, text: &str);
}

/// 新的播报总是打断仍在播放的旧播报，不排队
pub struct SpeechDispatcher {
  engine: Arc<dyn SpeechEngine>,
  runtime: Handle,
  current: Mutex<Option<JoinHandle<()>>>,
}

impl SpeechDispatcher {
  /// 需在 tokio 运行时内调用
  pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
    Self {
      engine,
      runtime: Handle::current(),
      current: Mutex::new(None),
    }
  }

  fn replace_current(&self, next: Option<JoinHandle<()>>) {
    let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(previous) = current.take() {
      if !previous.is_finished() {
        debug!("打断上一段播报");
      }
      previous.abort();
    }
    *current = next;
  }
}

impl Speaker for SpeechDispatcher {
  fn speak(&self, text: &str) {
    let engine = self.engine.clone();
    let text = text.to_string();
    // 先打断再启动，保证同一时刻只有一段语音
    self.replace_current(None);
    let handle = self.runtime.spawn(async move {
      engine.say(&text).await;
    });
    self.replace_current(Some(handle));
  }

  fn cancel(&self) {
    self.replace_current(None);
  }
}

impl Drop for SpeechDispatcher {
  fn drop(&mut self) {
    self.replace_current(None);
  }
}
