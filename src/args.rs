// 该文件是 LifeLens （慧眼） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use lifelens::mode::DetectionMode;

/// LifeLens 语音检测助手
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 摄像头来源
  /// 支持格式:
  /// - 图片: image:///path/to/frame.png
  #[arg(long, value_name = "URL")]
  pub camera: Url,

  /// JSON 配置文件，缺省时使用内置配置
  /// 内置配置使用 onnx:// 模型，仅在启用 `onnx` 特性编译时可用；
  /// 否则需在配置文件中改用 replay:// 模型
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 覆盖全局采样间隔（毫秒）
  #[arg(long, value_name = "MS")]
  pub tick_ms: Option<u64>,

  /// 覆盖全局置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,

  /// 启动后直接打开的模式（名称或编号 1-4）
  #[arg(long, value_name = "MODE")]
  pub open: Option<DetectionMode>,

  /// 不从标准输入读取语音命令
  #[arg(long)]
  pub no_voice: bool,
}
