//! Phase identities and the canonical phase selector.
//!
//! A [`Phase`] is an opaque, named unit of transformation. Its stable
//! string name serves two purposes: it fixes the phase's position in
//! the selected order, and it names the phase's cache entry inside the
//! resume directory. The name is deliberately decoupled from any Rust
//! type so renaming an implementation never invalidates caches.

use serde::Serialize;

use crate::types::PipelineConfig;

/// Coarse classification used by dispatchers to route a phase to the
/// right execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PhaseKind {
    /// Normalizes the frame to the working resolution.
    Scale,
    /// Extracts the configured overlay region from the input.
    Crop,
    /// Recomposes the processed region onto the original input.
    Overlay,
    /// Matches the output's color distribution to the input's.
    Color,
    /// Core restoration work, executed by the restoration backend.
    Restore,
}

/// One ordered, named transformation step in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Phase {
    name: &'static str,
    kind: PhaseKind,
}

impl Phase {
    const fn new(name: &'static str, kind: PhaseKind) -> Self {
        Self { name, kind }
    }

    /// Stable identifier, used for ordering and cache-file naming.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Which execution unit handles this phase.
    #[must_use]
    pub const fn kind(&self) -> PhaseKind {
        self.kind
    }

    /// Cache file name for this phase's persisted artifact.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.png", self.name)
    }
}

/// Exposure and geometry correction (classical).
pub const PREPARE: Phase = Phase::new("prepare", PhaseKind::Restore);
/// Damage mask inference (model).
pub const MASK: Phase = Phase::new("mask", PhaseKind::Restore);
/// Mask cleanup: despeckle, close gaps (classical).
pub const MASK_REFINE: Phase = Phase::new("mask-refine", PhaseKind::Restore);
/// Fine damage localization (model).
pub const MASK_DETAIL: Phase = Phase::new("mask-detail", PhaseKind::Restore);
/// Mask compositing with the defect scalars (classical).
pub const MASK_FINALIZE: Phase = Phase::new("mask-finalize", PhaseKind::Restore);
/// Inpainting over the finalized mask (model).
pub const RESTORE: Phase = Phase::new("restore", PhaseKind::Restore);

/// Stretch to the working resolution.
pub const RESCALE: Phase = Phase::new("rescale", PhaseKind::Scale);
/// Fit to the working resolution, padding the remainder.
pub const SCALE_PAD: Phase = Phase::new("scale-pad", PhaseKind::Scale);
/// Cover the working resolution, center-cropping the overflow.
pub const SCALE_CROP: Phase = Phase::new("scale-crop", PhaseKind::Scale);
/// Extract the configured overlay region.
pub const CROP_REGION: Phase = Phase::new("crop-region", PhaseKind::Crop);
/// Paste the processed region back onto the original input.
pub const OVERLAY: Phase = Phase::new("overlay", PhaseKind::Overlay);
/// Reinhard-style color distribution transfer from the input.
pub const COLOR_TRANSFER: Phase = Phase::new("color-transfer", PhaseKind::Color);

/// The six core restoration phases, in canonical order.
pub const CORE_PHASES: [Phase; 6] = [
    PREPARE,
    MASK,
    MASK_REFINE,
    MASK_DETAIL,
    MASK_FINALIZE,
    RESTORE,
];

/// Produce the canonical ordered phase sequence for `config`.
///
/// Pure and deterministic: repeated calls with the same configuration
/// yield the same list. This matters because cache-file names and the
/// step-range indices are positional.
///
/// Layout:
/// - overlay configured: `crop-region`, `scale-pad`, the core phases,
///   then `overlay` last (two head phases, one tail phase);
/// - otherwise one scale phase is prepended when a [`ScaleMode`] is
///   active;
/// - `color-transfer` is appended after the core phases, before the
///   overlay recomposition tail when present.
///
/// [`ScaleMode`]: crate::types::ScaleMode
#[must_use]
pub fn select_phases(config: &PipelineConfig) -> Vec<Phase> {
    use crate::types::ScaleMode;

    let mut phases = Vec::with_capacity(CORE_PHASES.len() + 3);

    if config.overlay.is_some() {
        phases.push(CROP_REGION);
        phases.push(SCALE_PAD);
    } else {
        match config.scale_mode {
            ScaleMode::Off => {}
            ScaleMode::Rescale => phases.push(RESCALE),
            ScaleMode::ResizePad => phases.push(SCALE_PAD),
            ScaleMode::ResizeCrop => phases.push(SCALE_CROP),
        }
    }

    phases.extend(CORE_PHASES);

    if config.color_transfer {
        phases.push(COLOR_TRANSFER);
    }

    if config.overlay.is_some() {
        phases.push(OVERLAY);
    }

    phases
}
