//! kasane command-line interface: maps flags onto a
//! [`PipelineConfig`] and drives the pipeline through the worker
//! dispatcher.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use kasane_pipeline::{Device, PipelineConfig, Region, RestoreScalars, ScaleMode};
use kasane_worker::WorkerDispatcher;
use tracing_subscriber::EnvFilter;

/// Restore a damaged photo through the staged kasane pipeline,
/// persisting intermediate steps so runs can resume.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Path or http(s) URL of the photo to restore.
    #[arg(short, long)]
    input: String,

    /// Path the restored photo is written to.
    #[arg(short, long)]
    output: PathBuf,

    /// Shared directory where per-step artifacts are persisted and
    /// recovered from on resume.
    #[arg(short, long)]
    altered: Option<PathBuf>,

    /// Per-call cache root; takes precedence over --altered.
    #[arg(long)]
    folder_altered: Option<PathBuf>,

    /// Range of steps to execute, as <start>:<end> (both inclusive).
    #[arg(short, long, value_name = "START:END", value_parser = parse_steps)]
    steps: Option<(usize, usize)>,

    /// Export the artifact of this step as a side effect.
    #[arg(long)]
    export_step: Option<usize>,

    /// Destination of the exported step artifact. Default: export.png
    /// next to the output.
    #[arg(long)]
    export_step_path: Option<PathBuf>,

    /// Process only this region and recompose the result onto the
    /// original image. Format: <x0>,<y0>:<x1>,<y1>.
    #[arg(long, value_name = "X0,Y0:X1,Y1", value_parser = parse_region)]
    overlay: Option<Region>,

    /// Stretch the input to the working resolution.
    #[arg(long, conflicts_with_all = ["auto_resize", "auto_resize_crop"])]
    auto_rescale: bool,

    /// Fit the input to the working resolution, padding the remainder.
    #[arg(long, conflicts_with = "auto_resize_crop")]
    auto_resize: bool,

    /// Cover the working resolution, center-cropping the overflow.
    #[arg(long)]
    auto_resize_crop: bool,

    /// Match the output's color distribution to the input's.
    #[arg(long)]
    color_transfer: bool,

    /// Force CPU processing (slower).
    #[arg(long, conflicts_with = "gpu")]
    cpu: bool,

    /// GPU id to use; repeat for multiple GPUs. Default: 0.
    #[arg(long)]
    gpu: Vec<u32>,

    /// CPU cores available to the worker.
    #[arg(long, default_value_t = 4)]
    n_cores: usize,

    /// Rebuild the restoration backend per phase instead of keeping it
    /// resident (lower memory, slower).
    #[arg(long)]
    disable_persistent_backend: bool,

    /// Run the core phases as no-ops. Exercises scaling, overlay, and
    /// the resume cache without model weights.
    #[arg(long)]
    passthrough_restore: bool,

    /// Scratch removal strength.
    #[arg(long, default_value_t = 1.0)]
    scratch: f32,

    /// Dust and speckle removal strength.
    #[arg(long, default_value_t = 1.0)]
    dust: f32,

    /// Tear and crease reconstruction strength.
    #[arg(long, default_value_t = 1.0)]
    tear: f32,

    /// Film grain reduction strength.
    #[arg(long, default_value_t = 1.0)]
    grain: f32,

    /// Color fade compensation strength (0 disables).
    #[arg(long, default_value_t = 0.0)]
    fade: f32,
}

impl Args {
    fn scale_mode(&self) -> ScaleMode {
        if self.auto_rescale {
            ScaleMode::Rescale
        } else if self.auto_resize {
            ScaleMode::ResizePad
        } else if self.auto_resize_crop {
            ScaleMode::ResizeCrop
        } else {
            ScaleMode::Off
        }
    }

    fn device(&self) -> Device {
        if self.cpu {
            Device::Cpu
        } else if self.gpu.is_empty() {
            Device::default()
        } else {
            Device::Gpu(self.gpu.clone())
        }
    }

    fn into_config(self) -> PipelineConfig {
        let scale_mode = self.scale_mode();
        let device = self.device();
        let mut config = PipelineConfig::new(self.input, self.output);
        config.altered = self.altered;
        config.folder_cache = self.folder_altered;
        config.steps = self.steps;
        config.export_step = self.export_step;
        config.export_step_path = self.export_step_path;
        config.overlay = self.overlay;
        config.scale_mode = scale_mode;
        config.color_transfer = self.color_transfer;
        config.device = device;
        config.n_cores = self.n_cores;
        config.persistent_backend = !self.disable_persistent_backend;
        config.scalars = RestoreScalars {
            scratch: self.scratch,
            dust: self.dust,
            tear: self.tear,
            grain: self.grain,
            fade: self.fade,
        };
        config
    }
}

/// Parse `--steps <start>:<end>` (inclusive on the command line) into
/// the half-open range the executor expects.
fn parse_steps(value: &str) -> Result<(usize, usize), String> {
    let (start_str, end_str) = value
        .split_once(':')
        .ok_or_else(|| format!("steps must be '<start>:<end>', got: '{value}'"))?;
    let start: usize = start_str
        .trim()
        .parse()
        .map_err(|e| format!("invalid starting step '{start_str}': {e}"))?;
    let end: usize = end_str
        .trim()
        .parse()
        .map_err(|e| format!("invalid ending step '{end_str}': {e}"))?;
    if start > end {
        return Err(format!(
            "the ending step ({end}) must not precede the starting step ({start})",
        ));
    }
    Ok((start, end + 1))
}

/// Parse `--overlay <x0>,<y0>:<x1>,<y1>`.
fn parse_region(value: &str) -> Result<Region, String> {
    let malformed = || format!("overlay must be '<x0>,<y0>:<x1>,<y1>', got: '{value}'");
    let (top_left, bottom_right) = value.split_once(':').ok_or_else(malformed)?;
    let (x0, y0) = top_left.split_once(',').ok_or_else(malformed)?;
    let (x1, y1) = bottom_right.split_once(',').ok_or_else(malformed)?;

    let parse = |s: &str| -> Result<u32, String> {
        s.trim()
            .parse()
            .map_err(|e| format!("invalid overlay coordinate '{s}': {e}"))
    };
    let region = Region::new(parse(x0)?, parse(y0)?, parse(x1)?, parse(y1)?);
    if region.x0 >= region.x1 || region.y0 >= region.y1 {
        return Err(format!(
            "overlay corners must be ordered top-left before bottom-right, got: '{value}'",
        ));
    }
    Ok(region)
}

fn run(args: Args) -> anyhow::Result<()> {
    let dispatcher = if args.passthrough_restore {
        tracing::warn!("running with passthrough core phases; output is not a restoration");
        WorkerDispatcher::passthrough()
    } else {
        WorkerDispatcher::without_backend()
    };
    let config = args.into_config();
    kasane_pipeline::run(&config, &dispatcher).context("pipeline run failed")?;
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Err(err) = run(args) {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }
}
