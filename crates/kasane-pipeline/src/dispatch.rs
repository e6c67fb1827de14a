//! Worker dispatcher boundary.
//!
//! The executor hands one phase at a time to a [`Dispatch`]
//! implementation together with the full step sequence accumulated so
//! far. The call is synchronous and blocking; whatever process pool or
//! GPU fan-out the dispatcher uses internally is invisible here.

use crate::phase::Phase;
use crate::types::PipelineConfig;
use crate::Artifact;

/// Executes a single phase's computation.
pub trait Dispatch {
    /// Run `phase` over the accumulated `steps` (index 0 is the
    /// original input; the last entry is the previous phase's output)
    /// and return the new artifact.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the phase cannot be executed.
    /// The executor treats any dispatch failure as fatal for the run.
    fn dispatch(
        &self,
        phase: &Phase,
        steps: &[Artifact],
        config: &PipelineConfig,
    ) -> Result<Artifact, DispatchError>;
}

/// Dispatcher-side failure.
///
/// The executor does not recover from any variant; it attaches the
/// phase name and aborts the run. The split exists for diagnostics: an
/// unknown phase or a missing backend is a wiring problem, a failed
/// computation is not.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The dispatcher has no execution unit for the named phase.
    #[error("no runner for phase '{0}'")]
    UnknownPhase(String),

    /// No restoration backend could be built or found.
    #[error("restoration backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The phase's computation itself failed.
    #[error("{0}")]
    Failed(String),
}

impl DispatchError {
    /// Generic computation failure with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
