//! Content-addressed resume cache.
//!
//! The cache directory name is derived from the input's byte content,
//! so re-running the pipeline on the same file always resolves to the
//! same directory regardless of where the file lives or how many times
//! the run is repeated. Each executed phase persists its output as
//! `<phase-name>.png` inside that directory; a later resume recovers
//! skipped steps by reading those entries back.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::phase::Phase;
use crate::types::PipelineError;
use crate::Artifact;

/// Handle to a resolved per-input cache directory.
#[derive(Debug, Clone)]
pub struct ResumeCache {
    dir: PathBuf,
}

impl ResumeCache {
    /// Resolve (and create, if absent) the cache directory for `input`
    /// under `root`.
    ///
    /// The directory name is
    /// `<basename_without_ext>_<sha256_hex_of_input_bytes>`: identical
    /// content under the same logical name always maps to the same
    /// directory, and creation is idempotent, so concurrent runs over
    /// the same input may race on it safely. The directory is never
    /// deleted here.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] when the input cannot be
    /// read for hashing, and [`PipelineError::CacheDir`] when the
    /// directory cannot be created. Both are fatal; filesystem
    /// permission or space problems are not recoverable locally.
    pub fn resolve(input: &Path, root: &Path) -> Result<Self, PipelineError> {
        let bytes = fs::read(input).map_err(|_| PipelineError::NotFound {
            reference: input.display().to_string(),
        })?;
        let digest = hex::encode(Sha256::digest(&bytes));
        let stem = input
            .file_stem()
            .map_or_else(|| "input".to_owned(), |s| s.to_string_lossy().into_owned());

        let dir = root.join(format!("{stem}_{digest}"));
        fs::create_dir_all(&dir).map_err(|source| PipelineError::CacheDir {
            path: dir.clone(),
            source,
        })?;

        tracing::debug!(dir = %dir.display(), "resolved cache directory");
        Ok(Self { dir })
    }

    /// The resolved cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic path of a phase's cached artifact.
    #[must_use]
    pub fn artifact_path(&self, phase: &Phase) -> PathBuf {
        self.dir.join(phase.file_name())
    }

    /// Persist a phase's output artifact, overwriting any prior entry
    /// for that phase. Last writer wins; no locking, since writes for
    /// a given phase are byte-identical when the pipeline is
    /// deterministic.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Persist`] when encoding or writing
    /// fails.
    pub fn persist(&self, phase: &Phase, artifact: &Artifact) -> Result<PathBuf, PipelineError> {
        let path = self.artifact_path(phase);
        artifact
            .image()
            .save(&path)
            .map_err(|source| PipelineError::Persist {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}
