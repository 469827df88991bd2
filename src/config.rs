use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Which plane orientations the tracked environment offers as
/// placement targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaneDetectionMode {
    Any,
    Horizontal,
    Vertical,
}

impl PlaneDetectionMode {
    pub fn horizontal(self) -> bool {
        matches!(self, Self::Any | Self::Horizontal)
    }

    pub fn vertical(self) -> bool {
        matches!(self, Self::Any | Self::Vertical)
    }
}

#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Models directory, relative to the asset root.
    pub models_dir: String,
    /// Picker thumbnails directory, relative to the asset root.
    pub thumbnails_dir: String,
    pub plane_detection: PlaneDetectionMode,
    /// When enabled, tracked surfaces carry collision volumes so placed
    /// content has something to rest against.
    pub scene_reconstruction: bool,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            models_dir: "models".to_string(),
            thumbnails_dir: "thumbnails".to_string(),
            plane_detection: PlaneDetectionMode::Any,
            scene_reconstruction: true,
            window_width: 1400,
            window_height: 900,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: ron::de::SpannedError,
    },
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ron::de::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path`, falling back to the defaults when the file is
    /// missing or malformed. Only a parse error is worth reporting; a
    /// missing config is the normal first-run case.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|err| {
            eprintln!("Ignoring config: {err}");
            Self::default()
        })
    }
}
