//! Shared types for the kasane restoration pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dispatch::DispatchError;

/// Re-export `RgbaImage` so downstream crates can reference artifact
/// pixel data without depending on `image` directly.
pub use image::RgbaImage;

/// Side length (pixels) the restoration backend expects its working
/// frames to have. The scale phases normalize to this resolution.
pub const WORKING_SIZE: u32 = 512;

/// A rectangular region of the input image, in pixel coordinates.
///
/// `x0,y0` is the top-left corner and `x1,y1` the bottom-right corner
/// (exclusive). Coordinate ordering (`x0 < x1`, `y0 < y1`) is validated
/// by the CLI before a `Region` reaches the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Left edge.
    pub x0: u32,
    /// Top edge.
    pub y0: u32,
    /// Right edge (exclusive).
    pub x1: u32,
    /// Bottom edge (exclusive).
    pub y1: u32,
}

impl Region {
    /// Create a new region.
    #[must_use]
    pub const fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Region width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    /// Region height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }
}

/// How the input is normalized to [`WORKING_SIZE`] before the core
/// phases run.
///
/// The modes are mutually exclusive; the CLI enforces that at parse
/// time, so the config can carry a single enum instead of three flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleMode {
    /// No automatic scaling; the input is assumed to already be at the
    /// working resolution.
    #[default]
    Off,
    /// Stretch to the working resolution, ignoring aspect ratio.
    Rescale,
    /// Fit within the working resolution preserving aspect ratio, then
    /// pad the remainder.
    ResizePad,
    /// Cover the working resolution preserving aspect ratio, then
    /// center-crop the overflow.
    ResizeCrop,
}

impl ScaleMode {
    /// Whether any automatic scaling is configured.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Off)
    }
}

/// Compute device selection for the restoration backend.
///
/// Opaque to the executor; the worker passes it through to whatever
/// backend is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    /// Force CPU inference.
    Cpu,
    /// Use the listed GPU ids.
    Gpu(Vec<u32>),
}

impl Default for Device {
    fn default() -> Self {
        Self::Gpu(vec![0])
    }
}

/// Per-defect strength scalars forwarded to the restoration backend.
///
/// Values around 1.0 are neutral; 0.0 disables the corresponding
/// correction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RestoreScalars {
    /// Scratch removal strength.
    pub scratch: f32,
    /// Dust and speckle removal strength.
    pub dust: f32,
    /// Tear and crease reconstruction strength.
    pub tear: f32,
    /// Film grain reduction strength.
    pub grain: f32,
    /// Color fade compensation strength (0.0 disables).
    pub fade: f32,
}

impl Default for RestoreScalars {
    fn default() -> Self {
        Self {
            scratch: 1.0,
            dust: 1.0,
            tear: 1.0,
            grain: 1.0,
            fade: 0.0,
        }
    }
}

/// Configuration for one pipeline run.
///
/// Constructed once (by the CLI or an embedding application) and
/// read-only thereafter. Unvalidated combinations — a malformed step
/// range, inverted overlay coordinates — are the constructor's
/// responsibility; the executor only re-checks range bounds against
/// the selected phase list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Input reference: a local path or an `http(s)` URL.
    pub input: String,

    /// Path the final artifact is written to.
    pub output: PathBuf,

    /// Shared cache root where per-step artifacts are persisted and
    /// recovered from on resume.
    pub altered: Option<PathBuf>,

    /// Per-call cache root; takes precedence over [`Self::altered`]
    /// when both are set.
    pub folder_cache: Option<PathBuf>,

    /// Sub-range `[start, end)` of the selected phase list to execute.
    /// `None` runs the full pipeline.
    pub steps: Option<(usize, usize)>,

    /// Logical step index whose artifact is exported as a one-shot
    /// side effect during the run.
    pub export_step: Option<usize>,

    /// Destination for the exported step artifact. Defaults to
    /// `export.png` next to the output path.
    pub export_step_path: Option<PathBuf>,

    /// Process only this region of the input and recompose the result
    /// onto the original image at the end of the run.
    pub overlay: Option<Region>,

    /// Automatic scaling mode applied before the core phases.
    pub scale_mode: ScaleMode,

    /// Match the output's color distribution to the input's.
    pub color_transfer: bool,

    /// Compute device for the restoration backend.
    pub device: Device,

    /// CPU cores available to the worker.
    pub n_cores: usize,

    /// Keep the restoration backend resident across phase dispatches
    /// (lower latency, higher memory). When `false` the worker rebuilds
    /// it per dispatch.
    pub persistent_backend: bool,

    /// Per-defect strength scalars.
    pub scalars: RestoreScalars,
}

impl PipelineConfig {
    /// Create a config with the given input and output and defaults
    /// for everything else.
    pub fn new(input: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            altered: None,
            folder_cache: None,
            steps: None,
            export_step: None,
            export_step_path: None,
            overlay: None,
            scale_mode: ScaleMode::Off,
            color_transfer: false,
            device: Device::default(),
            n_cores: 4,
            persistent_backend: true,
            scalars: RestoreScalars::default(),
        }
    }

    /// The effective cache root: the per-call folder cache when set,
    /// otherwise the shared altered root.
    #[must_use]
    pub fn cache_root(&self) -> Option<&Path> {
        self.folder_cache
            .as_deref()
            .or(self.altered.as_deref())
    }
}

/// Errors that can occur while running the pipeline.
///
/// Every variant is fatal to the current run: the pipeline's steps are
/// strictly dependent, so a missing or corrupt intermediate artifact
/// invalidates everything downstream. There is no retry and no
/// partial-result emission.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// An artifact reference could not be opened or fetched.
    #[error("artifact not found: {reference}")]
    NotFound {
        /// The offending reference (path or URL).
        reference: String,
    },

    /// An artifact's bytes could not be decoded as an image.
    #[error("failed to decode artifact {reference}: {source}")]
    Malformed {
        /// The offending reference (path or URL).
        reference: String,
        /// The underlying decoder error.
        source: image::ImageError,
    },

    /// The worker dispatcher failed to execute a phase.
    #[error("phase '{phase}' failed: {source}")]
    Dispatch {
        /// Stable name of the failed phase.
        phase: String,
        /// The dispatcher-side error, opaque to the executor.
        source: DispatchError,
    },

    /// The cache directory could not be created.
    #[error("failed to create cache directory {path}: {source}")]
    CacheDir {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying filesystem error.
        source: std::io::Error,
    },

    /// A step artifact could not be written to the cache.
    #[error("failed to persist cache entry {path}: {source}")]
    Persist {
        /// The cache entry path.
        path: PathBuf,
        /// The underlying encode/write error.
        source: image::ImageError,
    },

    /// The final or exported artifact could not be written.
    #[error("failed to write artifact {path}: {source}")]
    Write {
        /// The destination path.
        path: PathBuf,
        /// The underlying encode/write error.
        source: image::ImageError,
    },

    /// The configuration is inconsistent with the selected phase list.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}
