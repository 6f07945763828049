// 该文件是 LifeLens （慧眼） 项目的一部分。
// src/model/replay.rs - 回放模型，返回预先录制的输出
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
  sync::atomic::{AtomicBool, Ordering},
  time::Duration,
};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{RawOutput, Tensor},
  model::{ModelError, Session},
  utils::url_path,
};

#[derive(Error, Debug)]
pub enum ReplayModelError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("输出文件格式错误: {0}")]
  FormatError(#[from] serde_json::Error),
  #[error("参数错误: {0}")]
  InvalidParameter(String),
}

const REPLAY_SCHEME: &str = "replay";

/// 每次推理都返回同一份录制输出的模型，`latency_ms` 参数模拟推理耗时
///
/// 例: `replay:///tmp/currency.json?latency_ms=300`
pub struct ReplayModel {
  output: RawOutput,
  latency: Duration,
  released: AtomicBool,
}

impl FromUrl for ReplayModel {
  type Error = ReplayModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != REPLAY_SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        REPLAY_SCHEME,
        url.scheme()
      );
      return Err(ReplayModelError::SchemeMismatch);
    }

    let mut latency = Duration::ZERO;
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "latency_ms" => {
          let ms = value
            .parse::<u64>()
            .map_err(|e| ReplayModelError::InvalidParameter(format!("latency_ms: {}", e)))?;
          latency = Duration::from_millis(ms);
        }
        other => debug!("忽略未知参数: {}", other),
      }
    }

    let path = url_path(url);
    info!("加载回放输出: {}", path.display());
    let content = std::fs::read_to_string(&path)?;
    let output: RawOutput = serde_json::from_str(&content)?;
    debug!("回放输出张量数量: {}", output.outputs.len());

    Ok(ReplayModel::new(output, latency))
  }
}

impl FromUrlWithScheme for ReplayModel {
  const SCHEME: &'static str = REPLAY_SCHEME;
}

impl ReplayModel {
  pub fn new(output: RawOutput, latency: Duration) -> Self {
    Self {
      output,
      latency,
      released: AtomicBool::new(false),
    }
  }

  pub async fn open(url: &Url) -> Result<Self, ReplayModelError> {
    let url = url.clone();
    tokio::task::spawn_blocking(move || Self::from_url(&url))
      .await
      .map_err(|e| ReplayModelError::IoError(std::io::Error::other(e)))?
  }
}

#[async_trait]
impl Session for ReplayModel {
  async fn run(&self, input: Tensor) -> Result<RawOutput, ModelError> {
    if self.released.load(Ordering::Acquire) {
      return Err(ModelError::Released);
    }
    debug!("回放推理, 输入形状 {:?}", input.shape);
    if !self.latency.is_zero() {
      tokio::time::sleep(self.latency).await;
    }
    Ok(self.output.clone())
  }

  async fn release(&self) {
    self.released.store(true, Ordering::Release);
    debug!("回放模型已释放");
  }
}
