//! Pipeline executor: phase-range setup, resume reconstruction, the
//! strictly sequential run loop, and export/persistence bookkeeping.
//!
//! The executor is a caller-owned context: it holds the selected phase
//! list and the growing step sequence for exactly one run. There is no
//! ambient shared state. Each iteration depends on the whole sequence
//! accumulated so far (including its own earlier iterations), so
//! phases never reorder or overlap; the only suspension point is the
//! blocking dispatch call.

use std::path::{Path, PathBuf};

use crate::artifact::{load, write_artifact, StepEntry};
use crate::cache::ResumeCache;
use crate::dispatch::Dispatch;
use crate::phase::{select_phases, Phase};
use crate::types::{PipelineConfig, PipelineError};
use crate::Artifact;

/// Execution context for one pipeline run.
///
/// [`Executor::new`] performs the setup phase (phase selection, cache
/// resolution, reconstruction and materialization of the initial step
/// sequence); [`Executor::run`] then drives the selected phase range
/// to completion and writes the final artifact.
pub struct Executor<'a, D: Dispatch> {
    config: &'a PipelineConfig,
    dispatcher: &'a D,
    phases: Vec<Phase>,
    steps: Vec<Artifact>,
    cache: Option<ResumeCache>,
    start: usize,
    end: usize,
}

impl<'a, D: Dispatch> Executor<'a, D> {
    /// Set up a run: select phases, resolve the cache directory,
    /// rebuild the prior step sequence and load every entry.
    ///
    /// When a cache root is configured, each skipped phase in
    /// `[0, start)` is assumed to have its output persisted in the
    /// cache directory and is referenced by path. Without a cache root
    /// skipped steps cannot be reconstructed: the raw input stands in
    /// for each of them. That substitution is a documented soft spot,
    /// not an error, and is logged as a warning.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] when the configured
    /// step range does not fit the selected phase list, and any loader
    /// or cache error encountered while materializing the initial
    /// sequence. All are fatal; no partial state survives.
    pub fn new(config: &'a PipelineConfig, dispatcher: &'a D) -> Result<Self, PipelineError> {
        let phases = select_phases(config);
        let (start, end) = config.steps.unwrap_or((0, phases.len()));
        if start > end || end > phases.len() {
            return Err(PipelineError::InvalidConfig(format!(
                "step range {start}..{end} out of bounds for {} phases",
                phases.len(),
            )));
        }

        let names: Vec<&str> = phases.iter().map(Phase::name).collect();
        tracing::debug!(phases = ?names, "selected phases");
        tracing::debug!(start, end, "phase range to execute");

        let cache = config
            .cache_root()
            .map(|root| ResumeCache::resolve(Path::new(&config.input), root))
            .transpose()?;

        let mut entries = vec![StepEntry::Reference(config.input.clone())];
        if let Some(cache) = &cache {
            for phase in &phases[..start] {
                let path = cache.artifact_path(phase);
                entries.push(StepEntry::Reference(path.to_string_lossy().into_owned()));
            }
        } else {
            if start > 0 {
                tracing::warn!(
                    skipped = start,
                    "no cache root configured; substituting the raw input for skipped steps",
                );
            }
            for _ in 0..start {
                entries.push(StepEntry::Reference(config.input.clone()));
            }
        }

        tracing::info!(prior_steps = entries.len() - 1, "materializing step sequence");
        let steps = entries
            .into_iter()
            .map(load)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            config,
            dispatcher,
            phases,
            steps,
            cache,
            start,
            end,
        })
    }

    /// The selected phase list for this run.
    #[must_use]
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// The step sequence accumulated so far. Index 0 is the original
    /// input; after setup with range start `s` the length is `s + 1`.
    #[must_use]
    pub fn steps(&self) -> &[Artifact] {
        &self.steps
    }

    /// Run the selected phase range to completion and write the final
    /// artifact to the configured output path.
    ///
    /// Per executed phase: dispatch with the full step sequence,
    /// append the result, fire the one-shot export trigger when its
    /// adjusted index is reached, and persist the result to the cache
    /// directory when caching is enabled (independent of export).
    ///
    /// # Errors
    ///
    /// Any dispatch, persist, or write failure aborts the run; the
    /// remaining phases do not execute and no final output is written.
    pub fn run(mut self) -> Result<Artifact, PipelineError> {
        let mut export = ExportTrigger::from_config(self.config);

        for step in self.start..self.end {
            let phase = self.phases[step];
            tracing::info!(phase = phase.name(), step, "running phase");

            let artifact = self
                .dispatcher
                .dispatch(&phase, &self.steps, self.config)
                .map_err(|source| PipelineError::Dispatch {
                    phase: phase.name().to_owned(),
                    source,
                })?;
            self.steps.push(artifact);

            if export.fires_at(step) {
                self.export_current()?;
            }

            if let (Some(cache), Some(result)) = (&self.cache, self.steps.last()) {
                let path = cache.persist(&phase, result)?;
                tracing::debug!(phase = phase.name(), path = %path.display(), "cached step output");
            }
        }

        let Some(result) = self.steps.last() else {
            return Err(PipelineError::InvalidConfig(
                "empty step sequence".to_owned(),
            ));
        };
        write_artifact(result, &self.config.output)?;
        tracing::info!(path = %self.config.output.display(), "wrote final artifact");
        Ok(result.clone())
    }

    /// One-shot side-channel write of the current step's artifact.
    ///
    /// With an overlay configured the qualifying artifact is first
    /// recomposed onto the original input by re-dispatching the final
    /// phase; the main step sequence is left untouched either way.
    fn export_current(&self) -> Result<(), PipelineError> {
        let path = self.config.export_step_path.clone().unwrap_or_else(|| {
            self.config
                .output
                .parent()
                .map_or_else(|| PathBuf::from("export.png"), |dir| dir.join("export.png"))
        });

        let recomposed;
        let artifact = if self.config.overlay.is_some() {
            let Some(phase) = self.phases.last() else {
                return Err(PipelineError::InvalidConfig("empty phase list".to_owned()));
            };
            recomposed = self
                .dispatcher
                .dispatch(phase, &self.steps, self.config)
                .map_err(|source| PipelineError::Dispatch {
                    phase: phase.name().to_owned(),
                    source,
                })?;
            &recomposed
        } else {
            let Some(last) = self.steps.last() else {
                return Err(PipelineError::InvalidConfig(
                    "empty step sequence".to_owned(),
                ));
            };
            last
        };

        write_artifact(artifact, &path)?;
        tracing::debug!(path = %path.display(), "exported step artifact");
        Ok(())
    }
}

/// One-shot trigger for the export-step side channel.
///
/// The requested index is expressed in the user-visible step
/// numbering, which counts the virtual phases an overlay (+2) or an
/// active scale mode (+1) inserts ahead of the core sequence; the
/// trigger fires when the physical phase index reaches the adjusted
/// target minus one. The arithmetic is positional and deliberately
/// kept out of the run loop so its policy can change independently.
#[derive(Debug)]
struct ExportTrigger {
    fire_at: Option<usize>,
}

impl ExportTrigger {
    fn from_config(config: &PipelineConfig) -> Self {
        let fire_at = config.export_step.and_then(|requested| {
            let mut adjusted = requested;
            if config.overlay.is_some() {
                adjusted += 2;
            }
            if config.scale_mode.is_active() {
                adjusted += 1;
            }
            adjusted.checked_sub(1)
        });
        Self { fire_at }
    }

    /// True exactly once, when `step` reaches the adjusted target.
    fn fires_at(&mut self, step: usize) -> bool {
        if self.fire_at == Some(step) {
            self.fire_at = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::dispatch::DispatchError;
    use crate::phase::CORE_PHASES;
    use crate::types::{Region, RgbaImage, ScaleMode};

    /// Test dispatcher: records every call and produces a small
    /// artifact stamped with the step count and phase name length, so
    /// outputs are deterministic and distinguishable.
    struct StampDispatcher {
        calls: RefCell<Vec<(&'static str, usize)>>,
        produced: RefCell<Vec<Artifact>>,
        fail_on: Option<&'static str>,
    }

    impl StampDispatcher {
        fn new() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                produced: RefCell::new(Vec::new()),
                fail_on: None,
            }
        }

        fn failing_on(phase: &'static str) -> Self {
            Self {
                fail_on: Some(phase),
                ..Self::new()
            }
        }

        fn call_names(&self) -> Vec<&'static str> {
            self.calls.borrow().iter().map(|(name, _)| *name).collect()
        }
    }

    impl Dispatch for StampDispatcher {
        fn dispatch(
            &self,
            phase: &Phase,
            steps: &[Artifact],
            _config: &PipelineConfig,
        ) -> Result<Artifact, DispatchError> {
            self.calls.borrow_mut().push((phase.name(), steps.len()));
            if self.fail_on == Some(phase.name()) {
                return Err(DispatchError::failed("simulated phase failure"));
            }
            #[allow(clippy::cast_possible_truncation)]
            let stamp = [steps.len() as u8, phase.name().len() as u8, 0, 255];
            let artifact = Artifact::new(RgbaImage::from_pixel(4, 4, image::Rgba(stamp)));
            self.produced.borrow_mut().push(artifact.clone());
            Ok(artifact)
        }
    }

    fn write_input_png(dir: &Path) -> String {
        let img = RgbaImage::from_pixel(8, 8, image::Rgba([100, 150, 200, 255]));
        let path = dir.join("photo.png");
        img.save(&path).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn base_config(dir: &Path) -> PipelineConfig {
        PipelineConfig::new(write_input_png(dir), dir.join("out.png"))
    }

    #[test]
    fn full_run_visits_every_phase_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let config = base_config(tmp.path());
        let dispatcher = StampDispatcher::new();

        let executor = Executor::new(&config, &dispatcher).unwrap();
        assert_eq!(executor.steps().len(), 1);
        executor.run().unwrap();

        let calls = dispatcher.calls.borrow();
        let expected: Vec<&str> = CORE_PHASES.iter().map(Phase::name).collect();
        assert_eq!(
            calls.iter().map(|(n, _)| *n).collect::<Vec<_>>(),
            expected,
        );
        // Each dispatch sees the sequence grown by exactly one:
        // lengths 1 (input only) through K.
        let seen: Vec<usize> = calls.iter().map(|(_, len)| *len).collect();
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6]);
        assert!(config.output.is_file());
    }

    #[test]
    fn final_output_equals_last_step_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let config = base_config(tmp.path());
        let dispatcher = StampDispatcher::new();

        let result = Executor::new(&config, &dispatcher).unwrap().run().unwrap();
        let written = load(StepEntry::Reference(
            config.output.to_string_lossy().into_owned(),
        ))
        .unwrap();
        assert_eq!(written, result);
    }

    #[test]
    fn out_of_bounds_range_is_invalid_config() {
        let tmp = tempfile::tempdir().unwrap();
        let dispatcher = StampDispatcher::new();

        let mut config = base_config(tmp.path());
        config.steps = Some((0, 99));
        assert!(matches!(
            Executor::new(&config, &dispatcher),
            Err(PipelineError::InvalidConfig(_)),
        ));

        config.steps = Some((4, 2));
        assert!(matches!(
            Executor::new(&config, &dispatcher),
            Err(PipelineError::InvalidConfig(_)),
        ));
    }

    #[test]
    fn empty_range_writes_input_as_output() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = base_config(tmp.path());
        config.steps = Some((0, 0));
        let dispatcher = StampDispatcher::new();

        let result = Executor::new(&config, &dispatcher).unwrap().run().unwrap();
        assert!(dispatcher.call_names().is_empty());
        assert_eq!(result.dimensions(), (8, 8));
        assert!(config.output.is_file());
    }

    #[test]
    fn resume_without_cache_substitutes_raw_input() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = base_config(tmp.path());
        config.steps = Some((2, CORE_PHASES.len()));
        let dispatcher = StampDispatcher::new();

        let executor = Executor::new(&config, &dispatcher).unwrap();
        let steps = executor.steps();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1], steps[0], "placeholder must be the raw input");
        assert_eq!(steps[2], steps[0], "placeholder must be the raw input");
    }

    #[test]
    fn resume_with_cache_reloads_persisted_steps() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_root = tmp.path().join("cache");
        let mut config = base_config(tmp.path());
        config.altered = Some(cache_root.clone());
        let dispatcher = StampDispatcher::new();

        // Full run populates the cache.
        Executor::new(&config, &dispatcher).unwrap().run().unwrap();
        let first_run = dispatcher.produced.borrow().clone();

        // Resume from step 2: entries 1 and 2 must be byte-identical
        // to the artifacts phases 0 and 1 actually produced on the
        // first run, not merely to whatever the cache holds.
        let mut resumed_config = config.clone();
        resumed_config.steps = Some((2, CORE_PHASES.len()));
        let resumed = Executor::new(&resumed_config, &dispatcher).unwrap();
        assert_eq!(resumed.steps().len(), 3);
        assert_eq!(resumed.steps()[1], first_run[0]);
        assert_eq!(resumed.steps()[2], first_run[1]);

        let cache = ResumeCache::resolve(
            Path::new(&config.input),
            &cache_root,
        )
        .unwrap();
        for (i, phase) in CORE_PHASES.iter().take(2).enumerate() {
            let cached = load(StepEntry::Reference(
                cache.artifact_path(phase).to_string_lossy().into_owned(),
            ))
            .unwrap();
            assert_eq!(resumed.steps()[i + 1], cached);
        }
    }

    #[test]
    fn resume_with_empty_cache_directory_fails_to_load() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = base_config(tmp.path());
        config.altered = Some(tmp.path().join("cache"));
        config.steps = Some((2, CORE_PHASES.len()));
        let dispatcher = StampDispatcher::new();

        // Nothing was ever persisted, so the referenced cache entries
        // do not exist and setup aborts.
        assert!(matches!(
            Executor::new(&config, &dispatcher),
            Err(PipelineError::NotFound { .. }),
        ));
    }

    #[test]
    fn dispatch_failure_leaves_no_output_and_no_later_cache_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_root = tmp.path().join("cache");
        let mut config = base_config(tmp.path());
        config.altered = Some(cache_root.clone());
        let dispatcher = StampDispatcher::failing_on("mask-refine");

        let result = Executor::new(&config, &dispatcher).unwrap().run();
        assert!(matches!(
            result,
            Err(PipelineError::Dispatch { ref phase, .. }) if phase == "mask-refine"
        ));
        assert!(!config.output.exists(), "no partial output may be written");

        let cache = ResumeCache::resolve(Path::new(&config.input), &cache_root).unwrap();
        assert!(cache.artifact_path(&CORE_PHASES[0]).is_file());
        assert!(cache.artifact_path(&CORE_PHASES[1]).is_file());
        for phase in &CORE_PHASES[2..] {
            assert!(
                !cache.artifact_path(phase).exists(),
                "no cache entry for the failed phase or later ones",
            );
        }
    }

    #[test]
    fn end_to_end_cache_scenario_populates_content_addressed_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_root = tmp.path().join("cache");
        let mut config = base_config(tmp.path());
        config.altered = Some(cache_root.clone());
        let dispatcher = StampDispatcher::new();

        Executor::new(&config, &dispatcher).unwrap().run().unwrap();

        let entries: Vec<_> = fs::read_dir(&cache_root).unwrap().collect();
        assert_eq!(entries.len(), 1, "one directory per input content");
        let dir = entries[0].as_ref().unwrap().path();
        let name = dir.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("photo_"));
        assert_eq!(name.len(), "photo_".len() + 64);

        for phase in &CORE_PHASES {
            assert!(dir.join(phase.file_name()).is_file());
        }
    }

    #[test]
    fn export_without_overlay_writes_current_artifact_to_default_path() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = base_config(tmp.path());
        // No overlay, no scale: adjusted = 2, fires at physical step 1.
        config.export_step = Some(2);
        let dispatcher = StampDispatcher::new();

        Executor::new(&config, &dispatcher).unwrap().run().unwrap();

        let export_path = tmp.path().join("export.png");
        assert!(export_path.is_file());
        // No extra dispatch happened for the export.
        assert_eq!(dispatcher.call_names().len(), CORE_PHASES.len());
    }

    #[test]
    fn export_with_overlay_redispatches_final_phase_once() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = base_config(tmp.path());
        config.overlay = Some(Region::new(0, 0, 4, 4));
        config.export_step = Some(1); // adjusted 3, fires at physical step 2
        config.export_step_path = Some(tmp.path().join("steps").join("export.png"));
        fs::create_dir_all(tmp.path().join("steps")).unwrap();
        let dispatcher = StampDispatcher::new();

        Executor::new(&config, &dispatcher).unwrap().run().unwrap();

        let calls = dispatcher.call_names();
        // Physical phases 0..=2, then the overlay re-dispatch, then the rest.
        assert_eq!(calls[0], "crop-region");
        assert_eq!(calls[1], "scale-pad");
        assert_eq!(calls[2], "prepare");
        assert_eq!(calls[3], "overlay");
        assert_eq!(calls.iter().filter(|n| **n == "overlay").count(), 2);
        assert!(config.export_step_path.as_ref().unwrap().is_file());
    }

    // ─────────── ExportTrigger arithmetic ───────────

    fn trigger(
        export_step: Option<usize>,
        overlay: bool,
        scale: bool,
    ) -> ExportTrigger {
        let mut config = PipelineConfig::new("in.png", "out.png");
        config.export_step = export_step;
        if overlay {
            config.overlay = Some(Region::new(0, 0, 1, 1));
        }
        if scale {
            config.scale_mode = ScaleMode::Rescale;
        }
        ExportTrigger::from_config(&config)
    }

    #[test]
    fn trigger_without_export_step_never_fires() {
        let mut t = trigger(None, true, true);
        assert!((0..20).all(|step| !t.fires_at(step)));
    }

    #[test]
    fn trigger_with_overlay_shifts_by_two() {
        // e=1, overlay, no scale: fires at physical step e+1 == 2.
        let mut t = trigger(Some(1), true, false);
        assert!(!t.fires_at(1));
        assert!(t.fires_at(2));
    }

    #[test]
    fn trigger_with_overlay_and_scale_shifts_by_three() {
        // e=1, overlay and a scale flag: fires at e+2 == 3.
        let mut t = trigger(Some(1), true, true);
        assert!(!t.fires_at(2));
        assert!(t.fires_at(3));
    }

    #[test]
    fn trigger_without_adjustment_fires_at_previous_index() {
        let mut t = trigger(Some(3), false, false);
        assert!(t.fires_at(2));
    }

    #[test]
    fn trigger_step_zero_without_adjustment_never_fires() {
        let mut t = trigger(Some(0), false, false);
        assert!((0..20).all(|step| !t.fires_at(step)));
    }

    #[test]
    fn trigger_is_one_shot() {
        let mut t = trigger(Some(2), false, false);
        assert!(t.fires_at(1));
        assert!(!t.fires_at(1));
    }
}
