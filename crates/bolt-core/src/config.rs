use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TEMPLATE_ID: &str = "create-react-app";
pub const DEFAULT_OPEN_FILE: &str = "src/App.js";
pub const DEFAULT_PREVIEW_TITLE: &str = "React Todo App";
pub const DEFAULT_PREVIEW_DESCRIPTION: &str = "A React Todo Application";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub preview: PreviewConfig,
    pub generation: GenerationConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preview: PreviewConfig::default(),
            generation: GenerationConfig::default(),
            storage: StorageConfig::default(),
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PreviewConfig {
    pub template_id: String,
    pub open_file: String,
    pub default_title: String,
    pub default_description: String,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            template_id: DEFAULT_TEMPLATE_ID.to_string(),
            open_file: DEFAULT_OPEN_FILE.to_string(),
            default_title: DEFAULT_PREVIEW_TITLE.to_string(),
            default_description: DEFAULT_PREVIEW_DESCRIPTION.to_string(),
        }
    }
}

/// External command used to reach the generation service.
///
/// The prompt is written to the program's stdin and its stdout is taken as
/// the raw response.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct GenerationConfig {
    pub program: Option<String>,
    pub args: Vec<String>,
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            system_prompt_path: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    pub state_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { state_dir: None }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}
