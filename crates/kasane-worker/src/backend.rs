//! Restoration backend boundary.
//!
//! The six core phases (prepare, mask, mask-refine, mask-detail,
//! mask-finalize, restore) are executed by whatever backend the
//! embedding application registers. Model inference itself is out of
//! scope for this workspace; the backend trait is the seam where it
//! plugs in.

use kasane_pipeline::{Artifact, DispatchError, Phase, PipelineConfig};

/// Executes the core restoration phases.
///
/// A backend is constructed per run (or per dispatch, when the
/// persistent flag is off) from the configured [`Device`] and core
/// count; implementations decide what those mean.
///
/// [`Device`]: kasane_pipeline::Device
pub trait RestoreBackend {
    /// Run one core phase over the accumulated step sequence and
    /// return the new artifact.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the phase cannot be computed.
    fn run_phase(
        &self,
        phase: &Phase,
        steps: &[Artifact],
        config: &PipelineConfig,
    ) -> Result<Artifact, DispatchError>;
}

/// Builds a [`RestoreBackend`] for a run.
pub type BackendFactory =
    Box<dyn Fn(&PipelineConfig) -> Result<Box<dyn RestoreBackend>, DispatchError>>;

/// Backend that returns the previous step's artifact unchanged.
///
/// Useful for exercising the executor, the resume cache, and the
/// virtual phases without model weights. The output is obviously not a
/// restoration.
pub struct PassthroughBackend;

impl RestoreBackend for PassthroughBackend {
    fn run_phase(
        &self,
        phase: &Phase,
        steps: &[Artifact],
        _config: &PipelineConfig,
    ) -> Result<Artifact, DispatchError> {
        tracing::debug!(phase = phase.name(), "passthrough backend: copying previous step");
        steps
            .last()
            .cloned()
            .ok_or_else(|| DispatchError::failed("empty step sequence"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use kasane_pipeline::phase::MASK;

    #[test]
    fn passthrough_returns_last_step() {
        let config = PipelineConfig::new("in.png", "out.png");
        let first = Artifact::new(RgbaImage::from_pixel(2, 2, image::Rgba([1, 1, 1, 255])));
        let last = Artifact::new(RgbaImage::from_pixel(2, 2, image::Rgba([9, 9, 9, 255])));

        let out = PassthroughBackend
            .run_phase(&MASK, &[first, last.clone()], &config)
            .unwrap();
        assert_eq!(out, last);
    }

    #[test]
    fn passthrough_rejects_empty_sequence() {
        let config = PipelineConfig::new("in.png", "out.png");
        assert!(PassthroughBackend.run_phase(&MASK, &[], &config).is_err());
    }
}
