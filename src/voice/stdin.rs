// 该文件是 LifeLens （慧眼） 项目的一部分。
// src/voice/stdin.rs - 标准输入识别器
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

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use tokio::{
  io::{AsyncBufReadExt, AsyncRead, BufReader},
  sync::{Mutex, mpsc},
};
use tracing::{debug, warn};

use crate::voice::{RecognitionEvent, SpeechRecognizer, VoiceError};

enum Phase {
  Start,
  Listen,
  End,
  Done,
}

/// 把每一行输入当作一次识别结果，输入结束后识别器不可用
pub struct StdinRecognizer {
  lines: Arc<Mutex<mpsc::Receiver<String>>>,
  closed: Arc<AtomicBool>,
}

impl StdinRecognizer {
  /// 需在 tokio 运行时内调用
  pub fn new() -> Self {
    Self::from_reader(tokio::io::stdin())
  }

  pub fn from_reader<R>(reader: R) -> Self
  where
    R: AsyncRead + Send + Unpin + 'static,
  {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
      let mut lines = BufReader::new(reader).lines();
      loop {
        match lines.next_line().await {
          Ok(Some(line)) => {
            if tx.send(line).await.is_err() {
              break;
            }
          }
          Ok(None) => break,
          Err(e) => {
            warn!("读取输入失败: {}", e);
            break;
          }
        }
      }
      debug!("输入已结束");
    });

    Self {
      lines: Arc::new(Mutex::new(rx)),
      closed: Arc::new(AtomicBool::new(false)),
    }
  }
}

#[async_trait]
impl SpeechRecognizer for StdinRecognizer {
  async fn start(&self) -> Result<BoxStream<'static, RecognitionEvent>, VoiceError> {
    if self.closed.load(Ordering::Acquire) {
      return Err(VoiceError::Unavailable("输入已结束".to_string()));
    }

    let lines = self.lines.clone();
    let closed = self.closed.clone();
    let events = futures::stream::unfold(Phase::Start, move |phase| {
      let lines = lines.clone();
      let closed = closed.clone();
      async move {
        match phase {
          Phase::Start => Some((RecognitionEvent::Start, Phase::Listen)),
          Phase::Listen => match lines.lock().await.recv().await {
            Some(line) => Some((RecognitionEvent::Result(line), Phase::End)),
            None => {
              closed.store(true, Ordering::Release);
              Some((RecognitionEvent::End, Phase::Done))
            }
          },
          Phase::End => Some((RecognitionEvent::End, Phase::Done)),
          Phase::Done => None,
        }
      }
    });
    Ok(events.boxed())
  }
}
