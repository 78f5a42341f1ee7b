//! Model Metadata Exporter
//!
//! Writes the resolved shape of every model as JSON for downstream binding
//! generators:
//!
//! ```json
//! {
//!   "app.Counter": {
//!     "values": { "count": "kotlin.Int" },
//!     "init": {},
//!     "isInitSuspend": false,
//!     "intents": {
//!       "increment": { "c": "app.Counter", "by": "kotlin.Int" },
//!       "SUSPEND_double": { "model": "app.Counter" }
//!     }
//!   }
//! }
//! ```
//!
//! Maps keep declaration order.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{KirokError, Result};
use crate::resolver::{duplicate_intent_names, ModelDescriptor};
use crate::symbols::{Parameter, SymbolQuery};

/// Prefix marking asynchronous intents in the manifest.
pub const SUSPEND_PREFIX: &str = "SUSPEND_";

/// Name of the synthetic parameter injected for method and extension intents.
pub const MODEL_PARAMETER: &str = "model";

/// Parameter name to type string.
pub type ParameterMap = IndexMap<String, String>;

// =====================================================
// Document
// =====================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelData {
    pub values: ParameterMap,
    pub init: ParameterMap,
    pub is_init_suspend: bool,
    pub intents: IndexMap<String, ParameterMap>,
}

/// Qualified model name to model data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestDocument {
    pub models: IndexMap<String, ModelData>,
}

impl ManifestDocument {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| KirokError::Manifest(format!("Invalid manifest: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

fn parameter_map(query: &dyn SymbolQuery, parameters: &[Parameter]) -> ParameterMap {
    parameters
        .iter()
        .map(|p| (p.name.clone(), query.type_string(&p.ty)))
        .collect()
}

/// Builds the manifest entry of one model. Intents with a duplicated name are
/// left out.
pub fn model_data(query: &dyn SymbolQuery, model: &ModelDescriptor) -> ModelData {
    let duplicates = duplicate_intent_names(&model.intents);
    let model_type = query.type_string(&model.ty);

    let mut intents = IndexMap::new();
    for intent in model
        .intents
        .iter()
        .filter(|i| !duplicates.contains(&i.name))
    {
        let prefix = if intent.is_suspending() { SUSPEND_PREFIX } else { "" };

        let mut parameters = ParameterMap::new();
        if intent.convention.is_receiver_call() {
            parameters.insert(MODEL_PARAMETER.to_string(), model_type.clone());
        }
        parameters.extend(parameter_map(query, &intent.declared_parameters));

        intents.insert(format!("{}{}", prefix, intent.name), parameters);
    }

    ModelData {
        values: parameter_map(query, &model.fields),
        init: model
            .init
            .as_ref()
            .map(|init| parameter_map(query, &init.parameters))
            .unwrap_or_default(),
        is_init_suspend: model
            .init
            .as_ref()
            .map(|init| init.is_suspending())
            .unwrap_or(false),
        intents,
    }
}

pub fn export_manifest(query: &dyn SymbolQuery, models: &[ModelDescriptor]) -> ManifestDocument {
    ManifestDocument {
        models: models
            .iter()
            .map(|model| (model.qualified_name.clone(), model_data(query, model)))
            .collect(),
    }
}

/// Writes the manifest, best effort. Failures are logged and reported as
/// `false`, never propagated.
pub fn write_manifest(path: &Path, document: &ManifestDocument) -> bool {
    let written = document.to_json().and_then(|json| {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    });

    match written {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to write manifest {}: {}", path.display(), e);
            false
        }
    }
}
