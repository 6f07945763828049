// 该文件是 LifeLens （慧眼） 项目的一部分。
// src/voice.rs - 语音命令
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

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use futures::{StreamExt, stream::BoxStream};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
  mode::{Command, DetectionMode, ModeInput},
  output::Speaker,
};

mod stdin;
pub use self::stdin::StdinRecognizer;

pub const READY_TEXT: &str = "Ready for commands";
pub const MICROPHONE_PERMISSION_TEXT: &str = "Microphone access needed for voice commands";

/// 识别出的一句话
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceCommand {
  pub raw_transcript: String,
  pub normalized: String,
  pub timestamp: DateTime<Local>,
}

impl VoiceCommand {
  pub fn new(transcript: &str) -> Self {
    Self {
      raw_transcript: transcript.to_string(),
      normalized: normalize(transcript),
      timestamp: Local::now(),
    }
  }

  pub fn command(&self) -> Command {
    parse_token(&self.normalized).unwrap_or_else(|| Command::Unrecognized {
      raw: self.raw_transcript.clone(),
    })
  }
}

/// 小写、去首尾空白、合并连续空白、去掉末尾标点
pub fn normalize(transcript: &str) -> String {
  let collapsed = transcript
    .to_lowercase()
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ");
  collapsed
    .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
    .to_string()
}

/// 整句匹配固定词表，不做子串匹配
pub fn parse_token(normalized: &str) -> Option<Command> {
  let command = match normalized {
    "1" | "one" | "ek" | "currency" | "money" => Command::Open(DetectionMode::Currency),
    "2" | "two" | "do" | "object" | "objects" => Command::Open(DetectionMode::Object),
    "3" | "three" | "teen" | "text" | "read" => Command::Open(DetectionMode::Text),
    "4" | "four" | "char" | "chaar" | "hurdle" | "obstacle" => Command::Open(DetectionMode::Hurdle),
    "close" | "stop" | "exit" | "band" | "band karo" => Command::Close,
    _ => return None,
  };
  Some(command)
}

/// 识别会话中的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
  Start,
  Result(String),
  End,
  Error(String),
}

#[derive(Error, Debug)]
pub enum VoiceError {
  #[error("麦克风权限被拒绝")]
  PermissionDenied,
  #[error("语音识别不可用: {0}")]
  Unavailable(String),
  #[error("启动识别失败: {0}")]
  StartFailed(String),
}

/// 语音识别能力，每次 `start` 开启一个识别会话，丢弃事件流即取消
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
  async fn request_permission(&self) -> Result<(), VoiceError> {
    Ok(())
  }

  async fn start(&self) -> Result<BoxStream<'static, RecognitionEvent>, VoiceError>;
}

/// 持续监听语音命令，每个会话结束后自动重启
pub struct VoiceListener {
  recognizer: Arc<dyn SpeechRecognizer>,
  speaker: Arc<dyn Speaker>,
  commands: mpsc::Sender<ModeInput>,
  restart_delay: Duration,
}

impl VoiceListener {
  pub fn new(
    recognizer: Arc<dyn SpeechRecognizer>,
    speaker: Arc<dyn Speaker>,
    commands: mpsc::Sender<ModeInput>,
    restart_delay: Duration,
  ) -> Self {
    Self {
      recognizer,
      speaker,
      commands,
      restart_delay,
    }
  }

  pub async fn run(self, cancel: CancellationToken) {
    if let Err(e) = self.recognizer.request_permission().await {
      warn!("语音控制不可用: {}", e);
      self.speaker.speak(MICROPHONE_PERMISSION_TEXT);
      return;
    }

    let mut greeted = false;
    let mut sessions = 0u64;
    while !cancel.is_cancelled() {
      match self.recognizer.start().await {
        Ok(events) => {
          sessions += 1;
          debug!("第 {} 次识别会话", sessions);
          if !greeted {
            self.speaker.speak(READY_TEXT);
            greeted = true;
          }
          if !self.drain(events, &cancel).await {
            break;
          }
        }
        Err(VoiceError::Unavailable(reason)) => {
          error!("语音识别不可用，停止监听: {}", reason);
          break;
        }
        Err(e) => warn!("启动识别失败: {}", e),
      }

      tokio::select! {
        biased;
        _ = cancel.cancelled() => break,
        _ = tokio::time::sleep(self.restart_delay) => {}
      }
    }
    info!("语音监听已停止");
  }

  /// 消费一个识别会话，返回 `false` 表示应停止监听
  async fn drain(
    &self,
    mut events: BoxStream<'static, RecognitionEvent>,
    cancel: &CancellationToken,
  ) -> bool {
    loop {
      let event = tokio::select! {
        biased;
        _ = cancel.cancelled() => return false,
        event = events.next() => event,
      };

      match event {
        Some(RecognitionEvent::Start) => debug!("开始识别"),
        Some(RecognitionEvent::Result(transcript)) => {
          let voice = VoiceCommand::new(&transcript);
          info!("识别结果: {:?} -> {:?}", voice.raw_transcript, voice.normalized);
          if self.commands.send(ModeInput::Voice(voice)).await.is_err() {
            debug!("命令通道已关闭");
            return false;
          }
        }
        Some(RecognitionEvent::Error(reason)) => {
          warn!("识别出错，稍后重启: {}", reason);
          return true;
        }
        Some(RecognitionEvent::End) | None => return true,
      }
    }
  }
}
