//! Generator configuration.
//!
//! Settings are read from an optional `kirok.toml`. Every key has a default, so
//! an empty file (or no file at all) yields the stock annotation vocabulary:
//!
//! ```toml
//! package_suffix = "._kirok"
//! manifest_file = "kirok_model.json"
//! use_log = true
//!
//! [annotations]
//! model = "io.github.devngho.kirok.Model"
//! intent = "io.github.devngho.kirok.Intent"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{KirokError, Result};

/// Default config file name looked up next to the snapshot.
pub const CONFIG_FILENAME: &str = "kirok.toml";

const KIROK_PACKAGE: &str = "io.github.devngho.kirok";

/// Qualified names of the annotations the generator reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationNames {
    pub model: String,
    pub intent: String,
    pub init: String,
    pub retrieve_with: String,
    pub retrieve_info: String,
    pub retrieve_data: String,
}

impl Default for AnnotationNames {
    fn default() -> Self {
        Self {
            model: format!("{}.Model", KIROK_PACKAGE),
            intent: format!("{}.Intent", KIROK_PACKAGE),
            init: format!("{}.Init", KIROK_PACKAGE),
            retrieve_with: format!("{}.RetrieveWith", KIROK_PACKAGE),
            retrieve_info: format!("{}.RetrieveInfo", KIROK_PACKAGE),
            retrieve_data: format!("{}.RetrieveData", KIROK_PACKAGE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub annotations: AnnotationNames,
    /// Marker interface every retriever data payload implements.
    pub retriever_data_type: String,
    /// Two-element tuple type recognized for paired info/data returns.
    pub pair_type: String,
    /// Appended to a model's package to form the generated unit's package.
    pub package_suffix: String,
    pub manifest_file: String,
    /// Promotes per-model progress messages from debug to info.
    pub use_log: bool,
    /// Generation only runs when the snapshot contains this package.
    pub wasm_package: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            annotations: AnnotationNames::default(),
            retriever_data_type: format!("{}.RetrieverData", KIROK_PACKAGE),
            pair_type: "kotlin.Pair".to_string(),
            package_suffix: "._kirok".to_string(),
            manifest_file: "kirok_model.json".to_string(),
            use_log: false,
            wasm_package: "kotlin.wasm".to_string(),
        }
    }
}

impl GeneratorConfig {
    /// Parses a config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e: toml::de::Error| KirokError::Config(format!("Invalid kirok.toml: {}", e)))
    }

    /// Loads a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            KirokError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Loads `path` when given, otherwise `kirok.toml` in `dir` if present,
    /// otherwise the defaults.
    pub fn discover(path: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let candidate = dir.join(CONFIG_FILENAME);
        if candidate.is_file() {
            tracing::debug!("Using config {}", candidate.display());
            return Self::load(&candidate);
        }

        Ok(Self::default())
    }

    /// Package of the generated unit for a model living in `model_package`.
    pub fn generated_package(&self, model_package: &str) -> String {
        if model_package.is_empty() {
            self.package_suffix.trim_start_matches('.').to_string()
        } else {
            format!("{}{}", model_package, self.package_suffix)
        }
    }
}
