//! On-disk layout of saved classifiers.
//!
//! A saved classifier is a directory holding two files:
//!
//! * [`MODEL_FILE`]: JSON description of the architecture and the
//!   compilation parameters,
//! * [`WEIGHTS_FILE`]: the variables of the network, keyed by name.
//!
//! Both are written through an [`ArtifactWriter`], which stages them and only
//! moves them into place in [`ArtifactWriter::commit`], so a directory never
//! ends up holding one file without its pair.
use crate::{architecture::Architecture, config::CompileParams, error::BulwarkError};
use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// File name of the model description.
pub const MODEL_FILE: &str = "model.json";

/// File name of the weights.
pub const WEIGHTS_FILE: &str = "weights.safetensors";

/// Version of the model description format.
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Contents of [`MODEL_FILE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescription {
    /// Always [`MODEL_FORMAT_VERSION`] when written by this crate.
    pub format_version: u32,

    /// Layers and defences.
    pub architecture: Architecture,

    /// Loss, optimizer and metrics.
    pub compile: CompileParams,
}

impl ModelDescription {
    /// Creates a description in the current format.
    pub fn new(architecture: Architecture, compile: CompileParams) -> Self {
        Self {
            format_version: MODEL_FORMAT_VERSION,
            architecture,
            compile,
        }
    }

    /// Serializes to pretty-printed JSON.
    pub fn to_json_string_pretty(&self) -> Result<String, BulwarkError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BulwarkError::storage(format!("failed to serialize model: {}", e)))
    }

    /// Parses and validates a description.
    pub fn from_json_str(s: &str) -> Result<Self, BulwarkError> {
        let desc: Self = serde_json::from_str(s)
            .map_err(|e| BulwarkError::storage(format!("failed to parse model json: {}", e)))?;
        if desc.format_version != MODEL_FORMAT_VERSION {
            return Err(BulwarkError::storage(format!(
                "unsupported model format_version {}; expected {}",
                desc.format_version, MODEL_FORMAT_VERSION
            )));
        }
        desc.architecture
            .validate()
            .map_err(|e| BulwarkError::storage(format!("invalid architecture: {}", e)))?;
        desc.compile
            .validate()
            .map_err(|e| BulwarkError::storage(format!("invalid compile parameters: {}", e)))?;
        Ok(desc)
    }

    /// Reads [`MODEL_FILE`] from `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, BulwarkError> {
        let path = dir.as_ref().join(MODEL_FILE);
        let s = fs::read_to_string(&path).map_err(|e| {
            BulwarkError::storage(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&s)
    }
}

/// Returns the path of `name` in `dir` after checking it is a non-empty file.
pub fn existing_file(dir: impl AsRef<Path>, name: &str) -> Result<PathBuf, BulwarkError> {
    let path = dir.as_ref().join(name);
    match fs::metadata(&path) {
        Ok(m) if m.is_file() && m.len() > 0 => Ok(path),
        Ok(_) => Err(BulwarkError::storage(format!(
            "{} is empty or not a file",
            path.display()
        ))),
        Err(e) => Err(BulwarkError::storage(format!(
            "{} is missing: {}",
            path.display(),
            e
        ))),
    }
}

/// Scoped writer of the files of a saved classifier.
///
/// Files are written under staging names next to their targets and renamed
/// into place by [`ArtifactWriter::commit`]. Staged files are removed on drop
/// unless the writer has been committed, so a failed save leaves a previous
/// artifact in `dir` untouched.
pub struct ArtifactWriter {
    dir: PathBuf,
    staged: Vec<(PathBuf, PathBuf)>,
    committed: bool,
}

fn staging_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!(".{}.partial", name))
}

impl ArtifactWriter {
    /// Creates `dir` if needed.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, BulwarkError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            BulwarkError::storage(format!("failed to create {}: {}", dir.display(), e))
        })?;
        Ok(Self {
            dir,
            staged: Vec::new(),
            committed: false,
        })
    }

    /// Target directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stages `name` with `f`, which receives the path to write.
    ///
    /// The staged file is registered for cleanup before `f` runs, so a
    /// partial write is removed as well. Fails if `f` fails or leaves an
    /// empty file.
    pub fn write<F>(&mut self, name: &str, f: F) -> Result<(), BulwarkError>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let staging = staging_path(&self.dir, name);
        self.staged.push((staging.clone(), self.dir.join(name)));
        f(&staging).map_err(|e| {
            BulwarkError::storage(format!("failed to write {}: {}", staging.display(), e))
        })?;
        match fs::metadata(&staging) {
            Ok(m) if m.is_file() && m.len() > 0 => Ok(()),
            _ => Err(BulwarkError::storage(format!(
                "{} was left empty",
                staging.display()
            ))),
        }
    }

    /// Moves the staged files into place.
    ///
    /// If a rename fails, every target is removed, so `dir` never holds a
    /// new file next to an old one.
    pub fn commit(mut self) -> Result<(), BulwarkError> {
        for (staging, target) in self.staged.iter() {
            if let Err(e) = fs::rename(staging, target) {
                for (_, t) in self.staged.iter().filter(|(_, t)| t.exists()) {
                    if let Err(e) = fs::remove_file(t) {
                        warn!("Failed to remove {:?}: {}", t, e);
                    }
                }
                return Err(BulwarkError::storage(format!(
                    "failed to move {} into place: {}",
                    target.display(),
                    e
                )));
            }
        }
        self.committed = true;
        info!("Saved {:?} into {:?}", self.file_names(), self.dir);
        Ok(())
    }

    fn file_names(&self) -> Vec<String> {
        self.staged
            .iter()
            .filter_map(|(_, p)| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect()
    }
}

impl Drop for ArtifactWriter {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for (staging, _) in self.staged.iter() {
            if staging.exists() {
                if let Err(e) = fs::remove_file(staging) {
                    warn!("Failed to remove partial artifact {:?}: {}", staging, e);
                }
            }
        }
        if !self.staged.is_empty() {
            warn!("Discarded partial artifacts {:?} in {:?}", self.file_names(), self.dir);
        }
    }
}
