//! Writing engine artifacts to disk.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::compiler::{ENGINE_KEY, EngineArtifact};
use crate::error::{ConversionError, Result};

/// Extension of the raw engine file written next to the full-state file.
pub const ENGINE_EXTENSION: &str = "engine";

/// Locations written by [`ArtifactPersister::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedPaths {
    pub state: PathBuf,
    pub engine: Option<PathBuf>,
}

/// Serializes engine artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactPersister {
    save_engine: bool,
}

impl ArtifactPersister {
    pub fn new(save_engine: bool) -> Self {
        Self { save_engine }
    }

    /// Path of the raw engine file belonging to a full-state file.
    pub fn engine_path(state_path: &Path) -> PathBuf {
        state_path.with_extension(ENGINE_EXTENSION)
    }

    /// Write the full state to `path` and, when enabled, the raw engine
    /// bytes to [`ArtifactPersister::engine_path`].
    ///
    /// The engine entry and the engine path are checked before anything is
    /// written. A state path that already ends in `.engine` cannot be used
    /// together with raw engine output.
    pub fn save(&self, artifact: &EngineArtifact, path: impl AsRef<Path>) -> Result<PersistedPaths> {
        let path = path.as_ref();
        let engine = if self.save_engine {
            let bytes = artifact
                .engine_bytes()
                .ok_or_else(|| ConversionError::MissingEngineData {
                    key: ENGINE_KEY.to_string(),
                })?;
            let engine_path = Self::engine_path(path);
            if engine_path == path {
                return Err(ConversionError::EnginePathConflict { path: engine_path });
            }
            Some((engine_path, bytes))
        } else {
            None
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| ConversionError::io(parent, err))?;
        }

        let state = bincode::serialize(artifact)?;
        fs::write(path, &state).map_err(|err| ConversionError::io(path, err))?;
        info!(path = %path.display(), bytes = state.len(), "saved engine state");

        let engine_path = match engine {
            Some((engine_path, bytes)) => {
                fs::write(&engine_path, bytes)
                    .map_err(|err| ConversionError::io(&engine_path, err))?;
                info!(path = %engine_path.display(), bytes = bytes.len(), "saved raw engine");
                Some(engine_path)
            }
            None => None,
        };

        Ok(PersistedPaths {
            state: path.to_path_buf(),
            engine: engine_path,
        })
    }

    /// Read a full-state file written by [`ArtifactPersister::save`].
    pub fn load_state(path: impl AsRef<Path>) -> Result<EngineArtifact> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|err| ConversionError::io(path, err))?;
        Ok(bincode::deserialize(&bytes)?)
    }
}
