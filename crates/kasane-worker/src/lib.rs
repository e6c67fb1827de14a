//! kasane-worker: the execution unit behind the pipeline's
//! [`Dispatch`] boundary.
//!
//! One [`WorkerDispatcher`] serves one run. It routes each phase by
//! kind: the virtual phases (scaling, overlay extraction and
//! recomposition, color transfer) run on built-in runners; the core
//! restoration phases go to whatever [`RestoreBackend`] the embedding
//! application registered via a factory.
//!
//! The persistent flag in the configuration picks the backend's
//! lifetime: resident across all dispatches of the run (lower latency,
//! higher memory) or rebuilt per dispatch (the reverse). The
//! dispatcher is intentionally single-threaded — the executor calls it
//! strictly sequentially — so a `RefCell` holds the resident backend.

use std::cell::RefCell;

use kasane_pipeline::{Artifact, Dispatch, DispatchError, Phase, PhaseKind, PipelineConfig};

pub mod backend;
pub mod runners;

pub use backend::{BackendFactory, PassthroughBackend, RestoreBackend};

/// Dispatcher combining the built-in runners with a restoration
/// backend.
pub struct WorkerDispatcher {
    factory: BackendFactory,
    resident: RefCell<Option<Box<dyn RestoreBackend>>>,
}

impl WorkerDispatcher {
    /// Create a dispatcher that builds its restoration backend with
    /// `factory`.
    #[must_use]
    pub fn new(factory: BackendFactory) -> Self {
        Self {
            factory,
            resident: RefCell::new(None),
        }
    }

    /// Dispatcher whose core phases copy their input through
    /// unchanged. For exercising the engine without model weights.
    #[must_use]
    pub fn passthrough() -> Self {
        Self::new(Box::new(|_| Ok(Box::new(PassthroughBackend))))
    }

    /// Dispatcher with no restoration backend: the virtual phases
    /// work, the core phases fail at dispatch time.
    #[must_use]
    pub fn without_backend() -> Self {
        Self::new(Box::new(|_| {
            Err(DispatchError::BackendUnavailable(
                "no restoration backend registered; embed one via WorkerDispatcher::new"
                    .to_owned(),
            ))
        }))
    }

    fn run_restore(
        &self,
        phase: &Phase,
        steps: &[Artifact],
        config: &PipelineConfig,
    ) -> Result<Artifact, DispatchError> {
        if config.persistent_backend {
            let mut slot = self.resident.borrow_mut();
            if slot.is_none() {
                tracing::debug!(device = ?config.device, "initializing resident restoration backend");
                *slot = Some((self.factory)(config)?);
            }
            slot.as_ref().map_or_else(
                || Err(DispatchError::BackendUnavailable("resident slot empty".to_owned())),
                |backend| backend.run_phase(phase, steps, config),
            )
        } else {
            tracing::debug!(device = ?config.device, "initializing per-dispatch restoration backend");
            let backend = (self.factory)(config)?;
            backend.run_phase(phase, steps, config)
        }
    }
}

impl Dispatch for WorkerDispatcher {
    fn dispatch(
        &self,
        phase: &Phase,
        steps: &[Artifact],
        config: &PipelineConfig,
    ) -> Result<Artifact, DispatchError> {
        let Some(latest) = steps.last() else {
            return Err(DispatchError::failed("empty step sequence"));
        };
        tracing::debug!(phase = phase.name(), steps = steps.len(), "dispatching phase");

        match phase.kind() {
            PhaseKind::Scale => runners::scale(phase, latest, config),
            PhaseKind::Crop => runners::crop_region(latest, config),
            PhaseKind::Overlay => runners::overlay(steps, config),
            PhaseKind::Color => runners::color_transfer(steps),
            PhaseKind::Restore => self.run_restore(phase, steps, config),
        }
    }
}
