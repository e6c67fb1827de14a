//! Artifacts and the polymorphic artifact loader.
//!
//! A step sequence mixes freshly computed artifacts with cache-file
//! references recovered on resume, so entries are a tagged union:
//! [`StepEntry::Reference`] still needs loading, [`StepEntry::Loaded`]
//! passes through [`load`] unchanged.

use std::fs;
use std::io::Read;
use std::path::Path;

use crate::types::{PipelineError, RgbaImage};

/// An immutable in-memory image produced by loading a reference or by
/// a phase execution. A later step never mutates an earlier step's
/// artifact; it only appends a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    image: RgbaImage,
}

impl Artifact {
    /// Wrap an already-decoded image.
    #[must_use]
    pub const fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Decode raw bytes into an artifact.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Malformed`] (tagged with `reference`)
    /// when the bytes are not a decodable image.
    pub fn from_bytes(bytes: &[u8], reference: &str) -> Result<Self, PipelineError> {
        let image = image::load_from_memory(bytes).map_err(|source| PipelineError::Malformed {
            reference: reference.to_owned(),
            source,
        })?;
        Ok(Self::new(image.to_rgba8()))
    }

    /// The decoded pixel data.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Width and height in pixels.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// One entry of the step sequence: either a reference that still needs
/// loading or an already-materialized artifact.
#[derive(Debug, Clone)]
pub enum StepEntry {
    /// A local path or `http(s)` URL.
    Reference(String),
    /// An artifact that is already in memory.
    Loaded(Artifact),
}

/// Whether a string reference denotes a remote resource.
#[must_use]
pub fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// Resolve a step entry into an artifact.
///
/// Identity for [`StepEntry::Loaded`]. For references, fetches or
/// opens the bytes and decodes them.
///
/// # Errors
///
/// Returns [`PipelineError::NotFound`] when the reference cannot be
/// opened or fetched, and [`PipelineError::Malformed`] when its bytes
/// cannot be decoded. Both abort the run: downstream phases cannot
/// proceed without their predecessor artifacts.
pub fn load(entry: StepEntry) -> Result<Artifact, PipelineError> {
    match entry {
        StepEntry::Loaded(artifact) => Ok(artifact),
        StepEntry::Reference(reference) => {
            let bytes = if is_remote(&reference) {
                fetch_remote(&reference)?
            } else {
                fs::read(&reference).map_err(|_| PipelineError::NotFound {
                    reference: reference.clone(),
                })?
            };
            Artifact::from_bytes(&bytes, &reference)
        }
    }
}

fn fetch_remote(reference: &str) -> Result<Vec<u8>, PipelineError> {
    let not_found = || PipelineError::NotFound {
        reference: reference.to_owned(),
    };
    let response = ureq::get(reference).call().map_err(|_| not_found())?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut bytes)
        .map_err(|_| not_found())?;
    Ok(bytes)
}

/// Encode an artifact and write it to `path`.
///
/// The format is chosen from the path's extension by the `image`
/// crate.
///
/// # Errors
///
/// Returns [`PipelineError::Write`] when encoding or writing fails.
pub fn write_artifact(artifact: &Artifact, path: &Path) -> Result<(), PipelineError> {
    artifact
        .image()
        .save(path)
        .map_err(|source| PipelineError::Write {
            path: path.to_path_buf(),
            source,
        })
}
