// 该文件是 LifeLens （慧眼） 项目的一部分。
// src/output/console.rs - 终端语音引擎
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

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::output::SpeechEngine;

/// 每个字符的估计朗读时长
const MS_PER_CHAR: u64 = 60;

/// 把播报内容打印到日志，并按文本长度模拟播放时长
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSpeechEngine;

#[async_trait]
impl SpeechEngine for ConsoleSpeechEngine {
  async fn say(&self, text: &str) {
    info!("播报: {}", text);
    let duration = Duration::from_millis(MS_PER_CHAR * text.chars().count() as u64);
    tokio::time::sleep(duration).await;
  }
}
