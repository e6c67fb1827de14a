//! kasane-pipeline: phase selection, resume cache, and the sequential
//! pipeline executor for the kasane photo restoration pipeline.
//!
//! The crate is sans-UI and sans-worker: it decides *which* phases run
//! and in what order, reconstructs prior results from the
//! content-addressed resume cache, and drives each phase through the
//! [`Dispatch`] boundary one at a time. What a phase actually computes
//! lives behind that boundary (see `kasane-worker`).
//!
//! ```rust,no_run
//! use kasane_pipeline::{run, Artifact, Dispatch, DispatchError, Phase, PipelineConfig};
//!
//! struct MyDispatcher;
//!
//! impl Dispatch for MyDispatcher {
//!     fn dispatch(
//!         &self,
//!         phase: &Phase,
//!         steps: &[Artifact],
//!         config: &PipelineConfig,
//!     ) -> Result<Artifact, DispatchError> {
//!         // hand the phase to a worker pool, model backend, ...
//!         # unimplemented!()
//!     }
//! }
//!
//! # fn main() -> Result<(), kasane_pipeline::PipelineError> {
//! let config = PipelineConfig::new("photo.png", "restored.png");
//! let final_artifact = run(&config, &MyDispatcher)?;
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod cache;
pub mod dispatch;
pub mod executor;
pub mod phase;
pub mod types;

pub use artifact::{load, write_artifact, Artifact, StepEntry};
pub use cache::ResumeCache;
pub use dispatch::{Dispatch, DispatchError};
pub use executor::Executor;
pub use phase::{select_phases, Phase, PhaseKind};
pub use types::{
    Device, PipelineConfig, PipelineError, Region, RestoreScalars, ScaleMode, WORKING_SIZE,
};

/// Run the full configured pipeline: setup (phase selection, cache
/// resolution, step-sequence reconstruction) followed by sequential
/// execution, and return the final artifact.
///
/// # Errors
///
/// Propagates any [`PipelineError`]; every error is fatal to the run
/// and no partial output is written.
pub fn run<D: Dispatch>(config: &PipelineConfig, dispatcher: &D) -> Result<Artifact, PipelineError> {
    Executor::new(config, dispatcher)?.run()
}
