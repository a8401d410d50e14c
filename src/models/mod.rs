//! Scoring model families and the classifier that dispatches between them.
//!
//! A definition declares one family from a closed set; [`ScoringModel`] has one
//! variant per family and [`Classifier`] wraps it with the prepare/classify
//! lifecycle used by the scoring stage.

pub mod classifier;
pub mod clustering;
pub mod descriptor;
pub mod glm;
pub mod mining;
pub mod model;
pub mod predicate;
pub mod regression;
pub mod tree;

pub use classifier::Classifier;
pub use descriptor::ModelDescriptor;
pub use model::ScoringModel;
pub use predicate::Predicate;

use crate::domain::{Record, Schema, Value};

/// Append `name` to `out` unless it is already listed.
pub(crate) fn push_field(out: &mut Vec<String>, name: &str) {
    if !out.iter().any(|f| f == name) {
        out.push(name.to_string());
    }
}

/// Look up a field the model reads.
pub(crate) fn field<'a>(record: &'a Record, schema: &Schema, name: &str) -> Result<&'a Value, String> {
    record
        .get(schema, name)
        .ok_or_else(|| format!("missing field `{name}`"))
}

/// Look up a field and coerce it to `f64`.
pub(crate) fn numeric(record: &Record, schema: &Schema, name: &str) -> Result<f64, String> {
    let value = field(record, schema, name)?;
    if value.is_null() {
        return Err(format!("field `{name}` is empty"));
    }
    value
        .as_f64()
        .ok_or_else(|| format!("field `{name}` is not numeric: '{value}'"))
}
