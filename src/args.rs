// 该文件是 Fangwei （方位） 项目的一部分。
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
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::PathBuf;

use clap::Parser;

use fangwei::{
  input::DEFAULT_CAMERA_DEVICE,
  model::{ChannelOrder, DEFAULT_ANGLE_SCALE},
  task::PipelineConfig,
};

/// Fangwei 目标检测与方位标注
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源
  /// 支持格式:
  /// - 摄像头: camera 或 camera:///dev/video0?width=1280&height=720
  /// - 图片: *.jpg, *.jpeg, *.png，包含图片的目录，或 image:///path
  /// - 视频: *.mp4, *.avi, *.mkv 等，或 gstfile:///path（需要 gstreamer_input）
  #[arg(long, value_name = "SOURCE")]
  pub input: String,

  /// 输出目标
  /// 支持格式:
  /// - *.avi, *.mkv 或 gstvideo:///path/out.avi: 视频文件（需要 gstreamer_output）
  /// - 目录、无扩展名路径或 folder:///path?quality=90: Motion-JPEG 帧目录（需要 directory_record）
  #[arg(long, value_name = "OUTPUT")]
  pub output: String,

  /// 模型目录，包含 coco.names 与 yolov3.onnx
  #[arg(long, value_name = "MODEL_DIR")]
  pub yolo: PathBuf,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.5, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.3, value_name = "THRESHOLD")]
  pub threshold: f32,

  /// 每像素对应的水平角度（度）
  #[arg(long, default_value_t = DEFAULT_ANGLE_SCALE, value_name = "DEGREES")]
  pub angle_scale: f64,

  /// 打开实时显示窗口
  #[arg(long)]
  pub display: bool,

  /// 最大处理帧数
  #[arg(long, value_name = "COUNT")]
  pub max_frames: Option<u64>,

  /// 中断后等待主循环退出的秒数
  #[arg(long, default_value_t = 30, value_name = "SECONDS")]
  pub shutdown_grace: u64,

  /// 模型期望的通道顺序
  #[arg(long, value_enum, default_value_t = ChannelOrder::Rgb)]
  pub input_order: ChannelOrder,

  /// `--input camera` 使用的设备
  #[arg(long, default_value = DEFAULT_CAMERA_DEVICE, value_name = "DEVICE")]
  pub camera_device: String,
}

impl Args {
  pub fn pipeline_config(&self) -> PipelineConfig {
    PipelineConfig {
      confidence: self.confidence,
      nms_threshold: self.threshold,
      angle_scale: self.angle_scale,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults() {
    let args = Args::parse_from(["fangwei", "--input", "camera", "--output", "out", "--yolo", "yolo"]);
    assert_eq!(args.pipeline_config(), PipelineConfig::default());
    assert_eq!(args.shutdown_grace, 30);
    assert_eq!(args.input_order, ChannelOrder::Rgb);
    assert_eq!(args.camera_device, "/dev/video0");
    assert!(!args.display);
    assert!(args.max_frames.is_none());
  }

  #[test]
  fn overrides() {
    let args = Args::parse_from([
      "fangwei",
      "--input",
      "clip.mp4",
      "--output",
      "out.avi",
      "--yolo",
      "yolo",
      "--confidence",
      "0.6",
      "--threshold",
      "0.4",
      "--input-order",
      "bgr",
      "--max-frames",
      "10",
      "--display",
    ]);
    assert_eq!(args.confidence, 0.6);
    assert_eq!(args.threshold, 0.4);
    assert_eq!(args.input_order, ChannelOrder::Bgr);
    assert_eq!(args.max_frames, Some(10));
    assert_eq!(args.output, "out.avi");
    assert!(args.display);
  }
}
