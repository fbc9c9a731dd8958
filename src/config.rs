//! Runtime configuration.
//!
//! Everything the pipeline needs from the outside world (artifact paths, tool
//! locations, the model binding name) lives in one [`Config`] value that is
//! handed to [`crate::pipeline::VelocityInfer`] at construction.
//!
//! ```toml
//! tools_dir = "./Tools/utils"
//! model_path = "./Tools/models/model.onnx"
//! metadata_path = "./Tools/models/dataset32-MAESTRO-len4.json"
//! input_name = "input_5"
//! tool_timeout_secs = 120
//!
//! [upload]
//! upload_dir = "./UploadedFiles"
//! web_root = "./wwwroot"
//! base_url = "http://localhost:5000"
//! ```
//!
//! Environment overrides (`MVI_MODEL_PATH`, `MVI_METADATA_PATH`,
//! `MVI_TOOLS_DIR`) are applied after the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    CSV2MIDI_TOOL, DATASET_METADATA_PATH, MIDI2CSV_TOOL, MODEL_INPUT_NAME, MODEL_PATH, TOOLS_DIR,
    UPLOAD_DIR, WEB_ROOT,
};
use crate::tools::executable_name;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the midi2csv / csv2midi executables.
    pub tools_dir: PathBuf,
    pub model_path: PathBuf,
    pub metadata_path: PathBuf,
    /// Name of the model's single input tensor.
    pub input_name: String,
    /// Bounded wait for each external tool. `None` waits forever.
    pub tool_timeout_secs: Option<u64>,
    pub intra_threads: usize,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub upload_dir: PathBuf,
    pub web_root: PathBuf,
    pub base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tools_dir: PathBuf::from(TOOLS_DIR),
            model_path: PathBuf::from(MODEL_PATH),
            metadata_path: PathBuf::from(DATASET_METADATA_PATH),
            input_name: MODEL_INPUT_NAME.to_string(),
            tool_timeout_secs: Some(120),
            intra_threads: 1,
            upload: UploadConfig::default(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from(UPLOAD_DIR),
            web_root: PathBuf::from(WEB_ROOT),
            base_url: "http://localhost:5000".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then apply env overrides.
    ///
    /// A missing `path` yields the compiled defaults. An explicit path that
    /// cannot be read or parsed is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    fn apply_env_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(v) = lookup("MVI_MODEL_PATH") {
            self.model_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("MVI_METADATA_PATH") {
            self.metadata_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("MVI_TOOLS_DIR") {
            self.tools_dir = PathBuf::from(v);
        }
    }

    pub fn midi2csv_path(&self) -> PathBuf {
        self.tools_dir.join(executable_name(MIDI2CSV_TOOL))
    }

    pub fn csv2midi_path(&self) -> PathBuf {
        self.tools_dir.join(executable_name(CSV2MIDI_TOOL))
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }

    pub fn to_toml(&self) -> String {
        // Serializing a plain struct of paths and numbers cannot fail.
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
