// 该文件是 Pingzi （瓶子） 项目的一部分。
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

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use pingzi::{
  FromUrl,
  annotate::Annotator,
  config::{AppConfig, AugmentConfig, LiveConfig, SplitConfig},
  dataset::{
    Augmentor, Consolidator, DatasetManifest, RandomTransforms, Splitter, TrainingPipeline,
    TransformPipeline,
  },
  input::ImageSource,
  model::ModelWrapper,
  output::{Render, open_output},
  task::{InteractiveTask, interrupt_channel, single_shot},
};

/// Pingzi 瓶子检测：数据集准备与实时测距
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// 配置文件（TOML），命令行参数优先于配置文件
  #[arg(long, global = true, value_name = "FILE")]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// 将原始数据划分为 train/val/test
  Split(SplitArgs),
  /// 增强训练集
  Augment(AugmentArgs),
  /// 将增强结果合并回训练集
  Consolidate(ConsolidateArgs),
  /// 生成数据集清单 data.yaml
  Manifest(ManifestArgs),
  /// 依次执行划分、增强、合并与清单生成
  Pipeline(PipelineArgs),
  /// 对图片或图片目录检测，逐帧输出 JSON
  Detect(DetectArgs),
  /// 摄像头实时检测
  ///
  /// 摄像头需要启用 `v4l2_input` 或 `gstreamer_input` 特性，显示窗口需要 `gstreamer_output` 特性。
  Live(LiveArgs),
  /// 启动 HTTP 服务
  Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct SplitArgs {
  #[arg(long, value_name = "DIR")]
  image_dir: Option<PathBuf>,
  #[arg(long, value_name = "DIR")]
  label_dir: Option<PathBuf>,
  #[arg(long, value_name = "DIR")]
  output_dir: Option<PathBuf>,
  #[arg(long)]
  train_ratio: Option<f64>,
  #[arg(long)]
  val_ratio: Option<f64>,
  #[arg(long)]
  test_ratio: Option<f64>,
  /// 随机种子，缺省时每次结果不同
  #[arg(long)]
  seed: Option<u64>,
}

impl SplitArgs {
  fn apply(self, config: &mut SplitConfig) {
    override_with(&mut config.image_dir, self.image_dir);
    override_with(&mut config.label_dir, self.label_dir);
    override_with(&mut config.output_dir, self.output_dir);
    override_with(&mut config.train_ratio, self.train_ratio);
    override_with(&mut config.val_ratio, self.val_ratio);
    override_with(&mut config.test_ratio, self.test_ratio);
    if self.seed.is_some() {
      config.seed = self.seed;
    }
  }
}

#[derive(Args, Debug)]
struct AugmentArgs {
  #[arg(long, value_name = "DIR")]
  input_image_dir: Option<PathBuf>,
  #[arg(long, value_name = "DIR")]
  input_label_dir: Option<PathBuf>,
  #[arg(long, value_name = "DIR")]
  output_image_dir: Option<PathBuf>,
  #[arg(long, value_name = "DIR")]
  output_label_dir: Option<PathBuf>,
  /// 每张图片生成的变体数量
  #[arg(long)]
  aug_per_image: Option<usize>,
  #[arg(long)]
  seed: Option<u64>,
}

impl AugmentArgs {
  fn apply(self, config: &mut AugmentConfig) {
    override_with(&mut config.input_image_dir, self.input_image_dir);
    override_with(&mut config.input_label_dir, self.input_label_dir);
    override_with(&mut config.output_image_dir, self.output_image_dir);
    override_with(&mut config.output_label_dir, self.output_label_dir);
    override_with(&mut config.aug_per_image, self.aug_per_image);
    if self.seed.is_some() {
      config.seed = self.seed;
    }
  }
}

#[derive(Args, Debug)]
struct ConsolidateArgs {
  #[arg(long, value_name = "DIR")]
  src_image_dir: Option<PathBuf>,
  #[arg(long, value_name = "DIR")]
  src_label_dir: Option<PathBuf>,
  #[arg(long, value_name = "DIR")]
  dst_image_dir: Option<PathBuf>,
  #[arg(long, value_name = "DIR")]
  dst_label_dir: Option<PathBuf>,
  /// 合并后保留增强目录
  #[arg(long)]
  no_cleanup: bool,
}

#[derive(Args, Debug)]
struct ManifestArgs {
  /// 数据集根目录，默认为划分输出目录
  #[arg(long, value_name = "DIR")]
  base_dir: Option<PathBuf>,
  /// 清单输出路径
  #[arg(long, value_name = "FILE")]
  path: Option<PathBuf>,
  /// 类别名称，逗号分隔
  #[arg(long, value_delimiter = ',')]
  names: Option<Vec<String>>,
}

#[derive(Args, Debug)]
struct PipelineArgs {
  /// 同时用于划分与增强的随机种子
  #[arg(long)]
  seed: Option<u64>,
  #[arg(long)]
  no_cleanup: bool,
}

#[derive(Args, Debug)]
struct ModelArgs {
  /// 模型 URL，例如 onnx:///artifacts/best.onnx
  #[arg(long, value_name = "MODEL")]
  model: Option<String>,
  /// 类别名称，逗号分隔
  #[arg(long, value_delimiter = ',')]
  class_names: Option<Vec<String>>,
  /// 标注字体
  #[arg(long, value_name = "FILE")]
  font: Option<PathBuf>,
  /// 目标实际宽度（厘米）
  #[arg(long)]
  known_width_cm: Option<f32>,
  /// 相机焦距（像素）
  #[arg(long)]
  focal_length_px: Option<f32>,
}

impl ModelArgs {
  fn apply(self, config: &mut LiveConfig) {
    override_with(&mut config.model, self.model);
    override_with(&mut config.class_names, self.class_names);
    if self.font.is_some() {
      config.font = self.font;
    }
    override_with(&mut config.known_width_cm, self.known_width_cm);
    override_with(&mut config.focal_length_px, self.focal_length_px);
  }
}

#[derive(Args, Debug)]
struct DetectArgs {
  /// 图片文件或图片目录
  #[arg(value_name = "INPUT")]
  input: PathBuf,
  /// 标注结果输出 URL，例如 image:///tmp/out.jpg 或 folder:///tmp/record?always
  #[arg(long, value_name = "OUTPUT")]
  output: Option<String>,
  #[command(flatten)]
  model: ModelArgs,
}

#[derive(Args, Debug)]
struct LiveArgs {
  /// 摄像头 URL，例如 v4l2:///dev/video1（需要 v4l2_input 特性）
  #[arg(long, value_name = "SOURCE")]
  camera: Option<String>,
  /// 输出 URL，例如 gst://display（需要 gstreamer_output 特性）或 folder:///tmp/record
  #[arg(long, value_name = "OUTPUT")]
  output: Option<String>,
  /// 最多处理的帧数
  #[arg(long)]
  max_frames: Option<usize>,
  #[command(flatten)]
  model: ModelArgs,
}

#[derive(Args, Debug)]
struct ServeArgs {
  /// 监听地址
  #[arg(long, value_name = "ADDR")]
  bind: Option<String>,
  /// 视频流使用的摄像头 URL
  #[arg(long, value_name = "SOURCE")]
  camera: Option<String>,
  #[command(flatten)]
  model: ModelArgs,
}

fn override_with<T>(target: &mut T, value: Option<T>) {
  if let Some(value) = value {
    *target = value;
  }
}

fn load_model(config: &LiveConfig) -> Result<ModelWrapper> {
  info!("加载模型: {}", config.model);
  let url = Url::parse(&config.model)?;
  Ok(ModelWrapper::from_url(&url)?)
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let cli = Cli::parse();
  let mut config = AppConfig::load(cli.config.as_deref())?;

  match cli.command {
    Command::Split(args) => {
      args.apply(&mut config.split);
      let report = Splitter::from_config(&config.split)?.run()?;
      info!(
        "划分完成: train {} / val {} / test {}, 无标签 {}",
        report.train.images.len(),
        report.val.images.len(),
        report.test.images.len(),
        report.train.unlabeled.len() + report.val.unlabeled.len() + report.test.unlabeled.len()
      );
    }
    Command::Augment(args) => {
      args.apply(&mut config.augment);
      let mut engine =
        RandomTransforms::with_seed(TransformPipeline::default(), config.augment.seed);
      let report = Augmentor::from_config(&config.augment).run(&mut engine)?;
      info!(
        "增强完成: 原图 {}, 变体 {}, 丢弃 {}, 跳过 {}",
        report.originals.len(),
        report.variants.len(),
        report.discarded.len(),
        report.skipped.len()
      );
    }
    Command::Consolidate(args) => {
      let augment = &config.augment;
      let consolidator = Consolidator::new(
        args.src_image_dir.unwrap_or_else(|| augment.output_image_dir.clone()),
        args.src_label_dir.unwrap_or_else(|| augment.output_label_dir.clone()),
        args.dst_image_dir.unwrap_or_else(|| augment.input_image_dir.clone()),
        args.dst_label_dir.unwrap_or_else(|| augment.input_label_dir.clone()),
      )
      .with_cleanup(config.consolidate.cleanup && !args.no_cleanup);
      let report = consolidator.run()?;
      info!(
        "合并完成: 图片 {}, 标签 {}",
        report.images_copied, report.labels_copied
      );
    }
    Command::Manifest(args) => {
      let base = args.base_dir.unwrap_or(config.split.output_dir);
      let path = args.path.unwrap_or(config.manifest.path);
      let names = args.names.unwrap_or(config.manifest.names);
      DatasetManifest::new(&base, names).write(&path)?;
      info!("数据集清单已写入: {}", path.display());
    }
    Command::Pipeline(args) => {
      if args.seed.is_some() {
        config.split.seed = args.seed;
        config.augment.seed = args.seed;
      }
      if args.no_cleanup {
        config.consolidate.cleanup = false;
      }
      let report = TrainingPipeline::from(&config).run()?;
      info!(
        "流水线完成: 划分 {} 张, 新增变体 {} 张, 清单 {}",
        report.split.total(),
        report.augment.variants.len(),
        config.manifest.path.display()
      );
    }
    Command::Detect(args) => {
      args.model.apply(&mut config.live);
      run_detect(&config.live, &args.input, args.output.as_deref())?;
    }
    Command::Live(args) => {
      args.model.apply(&mut config.live);
      override_with(&mut config.live.camera, args.camera);
      override_with(&mut config.live.output, args.output);
      if args.max_frames.is_some() {
        config.live.max_frames = args.max_frames;
      }
      run_live(&config.live)?;
    }
    Command::Serve(args) => {
      args.model.apply(&mut config.live);
      override_with(&mut config.live.camera, args.camera);
      override_with(&mut config.server.bind, args.bind);
      run_serve(&config)?;
    }
  }

  Ok(())
}

fn run_detect(config: &LiveConfig, input: &Path, output: Option<&str>) -> Result<()> {
  let model = load_model(config)?;
  let annotator = Annotator::from_config(config);
  let output = output.map(open_output).transpose()?;

  for frame in ImageSource::open(input)? {
    let frame = frame?;
    let (image, detections) = single_shot(&model, &annotator, frame.image)?;
    if let Some(output) = &output {
      output.render_result(&image, &detections)?;
    }
    println!(
      "{}",
      serde_json::json!({ "frame": frame.index, "detections": detections })
    );
  }
  Ok(())
}

fn run_live(config: &LiveConfig) -> Result<()> {
  let model = load_model(config)?;
  let annotator = Annotator::from_config(config);
  let output = open_output(&config.output)?;

  let mut task = InteractiveTask::default().with_max_frames(config.max_frames);
  match interrupt_channel() {
    Ok(rx) => task = task.with_interrupt(rx),
    Err(e) => warn!("无法注册中断处理: {}", e),
  }

  let outcome = task.run_url(&config.camera, &model, &annotator, &output)?;
  info!("实时检测结束: {:?}", outcome);
  Ok(())
}

#[cfg(feature = "web")]
fn run_serve(config: &AppConfig) -> Result<()> {
  use std::sync::Arc;

  use pingzi::web::{WebState, serve};

  let model = Arc::new(load_model(&config.live)?);
  let annotator = Annotator::from_config(&config.live);
  let state = WebState::new(model, annotator, config.live.camera.clone());

  let runtime = tokio::runtime::Runtime::new()?;
  runtime.block_on(serve(state, &config.server.bind))
}

#[cfg(not(feature = "web"))]
fn run_serve(_config: &AppConfig) -> Result<()> {
  anyhow::bail!("未启用 web 功能, 请使用 --features web 重新编译")
}
