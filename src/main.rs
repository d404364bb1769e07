// 该文件是 Fangwei （方位） 项目的一部分。
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
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

mod args;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use fangwei::{
  input::open_source,
  model::{Detector, Inference, Labels},
  output::{Annotator, Sink, VideoOutput},
  shutdown::{Outcome, ShutdownController},
  task::{ContinuousTask, PipelineConfig, PipelineContext, Task},
};

use args::Args;

fn main() -> ExitCode {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  match run(&args) {
    Ok(outcome) => ExitCode::from(outcome.exit_code()),
    Err(e) => {
      error!("运行失败: {:#}", e);
      ExitCode::from(Outcome::Failed.exit_code())
    }
  }
}

fn run(args: &Args) -> Result<Outcome> {
  info!("模型目录: {}", args.yolo.display());
  info!("输入来源: {}", args.input);
  info!("输出目标: {}", args.output);

  let config = args.pipeline_config().validate().context("参数无效")?;
  info!(
    "置信度阈值: {}, NMS 阈值: {}, 角度系数: {}",
    config.confidence, config.nms_threshold, config.angle_scale
  );

  let labels = Labels::load_from_dir(&args.yolo).context("无法加载类别标签")?;
  info!("已加载 {} 个类别", labels.len());

  load_and_run(args, config, labels)
}

#[cfg(feature = "onnx_model")]
fn load_and_run(args: &Args, config: PipelineConfig, labels: Labels) -> Result<Outcome> {
  let model = fangwei::model::OnnxYolo::load_from_dir(&args.yolo).context("无法加载模型权重")?;
  run_pipeline(args, config, labels, model)
}

#[cfg(not(feature = "onnx_model"))]
fn load_and_run(_args: &Args, _config: PipelineConfig, _labels: Labels) -> Result<Outcome> {
  anyhow::bail!("未启用推理后端，请使用 `--features onnx_model` 重新编译")
}

#[cfg_attr(not(feature = "onnx_model"), allow(dead_code))]
fn run_pipeline<M: Inference>(
  args: &Args,
  config: PipelineConfig,
  labels: Labels,
  model: M,
) -> Result<Outcome> {
  let detector = Detector::new(model).with_channel_order(args.input_order);
  let annotator = Annotator::new()?;

  let backend = VideoOutput::from_target(&args.output).context("无法创建输出")?;
  let sink = Arc::new(with_display(Sink::new(backend), args.display));

  let shutdown =
    Arc::new(ShutdownController::new().with_grace(Duration::from_secs(args.shutdown_grace)));
  shutdown.install_handler(Arc::clone(&sink))?;

  let input = open_source(&args.input, &args.camera_device).context("无法打开输入")?;

  let context = PipelineContext {
    config,
    detector,
    labels,
    annotator,
    sink,
    shutdown,
  };

  let summary = ContinuousTask::default()
    .with_frame_number(args.max_frames)
    .run_task(input, &context)?;
  info!("结束状态: {:?}", summary.outcome);
  Ok(summary.outcome)
}

#[cfg(feature = "gstreamer_output")]
fn with_display(sink: Sink<VideoOutput>, display: bool) -> Sink<VideoOutput> {
  if display {
    sink.with_display(Box::new(fangwei::output::GStreamerDisplay::new()))
  } else {
    sink
  }
}

#[cfg(not(feature = "gstreamer_output"))]
fn with_display(sink: Sink<VideoOutput>, display: bool) -> Sink<VideoOutput> {
  if display {
    tracing::warn!("未启用 gstreamer_output，忽略 --display");
  }
  sink
}
