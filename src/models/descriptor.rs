//! Parsed model definitions.
//!
//! A definition is a JSON object:
//!
//! ```json
//! { "family": "regression", "target": "label", "fields": ["x1", "x2"], "model": { ... } }
//! ```
//!
//! Only the envelope is interpreted here; `model` is kept as raw JSON and
//! deserialized by the family the tag selects.

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::domain::ModelFamily;
use crate::error::PatternError;

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    family: String,
    target: String,
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    model: serde_json::Value,
}

/// The envelope of a model definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    pub family: ModelFamily,
    /// Field the model predicts (the "predictor" in the source data).
    pub target: String,
    /// Fields the model reads from each record.
    pub active_fields: Vec<String>,
    params: serde_json::Value,
}

impl ModelDescriptor {
    /// Parse a definition from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, PatternError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| PatternError::malformed(e.to_string()))?;
        Self::from_value(value)
    }

    /// Parse a definition from an already-decoded JSON value.
    ///
    /// Ensemble members are nested definitions and go through here too, so
    /// every family tag in a file is checked against the same closed set.
    pub fn from_value(value: serde_json::Value) -> Result<Self, PatternError> {
        let raw: RawDescriptor =
            serde_json::from_value(value).map_err(|e| PatternError::malformed(e.to_string()))?;
        let family = raw.family.parse::<ModelFamily>()?;

        if raw.target.trim().is_empty() {
            return Err(PatternError::malformed("`target` must not be empty"));
        }

        Ok(Self {
            family,
            target: raw.target,
            active_fields: raw.fields,
            params: raw.model,
        })
    }

    /// Deserialize the family-specific parameters.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, PatternError> {
        serde_json::from_value(self.params.clone()).map_err(|e| {
            PatternError::malformed(format!("{} parameters: {e}", self.family.display_name()))
        })
    }
}
