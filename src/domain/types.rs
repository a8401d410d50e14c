//! Shared domain types.
//!
//! These types are deliberately small so they can flow through every stage of a
//! run without conversions:
//!
//! - cell values and records (`Value`, `Record`) aligned with a `Schema`
//! - trapped records (`TrapRecord`) and the per-stage routing result (`Routed`)
//! - the closed set of model families (`ModelFamily`)
//! - the run configuration (`FlowConfig`)

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PatternError;

/// A single cell value.
///
/// Tabular sources only ever produce `Text` and `Null` (empty cell); `Number`
/// is produced by numeric model families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
}

impl Value {
    /// Build a value from a raw delimited-text cell.
    pub fn from_cell(cell: &str) -> Self {
        if cell.is_empty() {
            Value::Null
        } else {
            Value::Text(cell.to_string())
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric coercion: numbers as-is, text parsed as `f64`.
    ///
    /// Returns `None` for nulls, unparseable text and non-finite results.
    pub fn as_f64(&self) -> Option<f64> {
        let v = match self {
            Value::Null => return None,
            Value::Number(v) => *v,
            Value::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        if v.is_finite() { Some(v) } else { None }
    }

    /// Label equality used by validation.
    ///
    /// Two values that both coerce to numbers compare numerically (so `"1"`
    /// matches `1.0`); everything else compares on the rendered string,
    /// case-sensitively. Null never matches anything.
    pub fn label_eq(&self, other: &Value) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self.to_string() == other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Number(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Text(value.to_string())
    }
}

/// Ordered field names with by-name lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<String>,
    index: HashMap<String, usize>,
}

impl Schema {
    /// Build a schema, rejecting duplicate names.
    pub fn new<I, S>(fields: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut schema = Schema {
            fields: Vec::new(),
            index: HashMap::new(),
        };
        for field in fields {
            schema = schema.with_field(field)?;
        }
        Ok(schema)
    }

    /// Return a copy of this schema with `name` appended.
    pub fn with_field(mut self, name: impl Into<String>) -> Result<Self, PatternError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(PatternError::FieldCollision { field: name });
        }
        self.index.insert(name.clone(), self.fields.len());
        self.fields.push(name);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Check that every name in `required` is present; `stage` names the
    /// consumer in the error.
    pub fn require(&self, stage: &str, required: &[String]) -> Result<(), PatternError> {
        match required.iter().find(|f| !self.contains(f)) {
            Some(missing) => Err(PatternError::MissingField {
                stage: stage.to_string(),
                field: missing.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// One row of values aligned positionally with a `Schema`.
///
/// Stages only ever append, so a record's first `n` values are always the
/// values of the source schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of the named field; `None` when the schema lacks it.
    pub fn get<'a>(&'a self, schema: &Schema, name: &str) -> Option<&'a Value> {
        schema.index_of(name).and_then(|idx| self.values.get(idx))
    }

    /// Return this record with `value` appended.
    pub fn appended(mut self, value: Value) -> Self {
        self.values.push(value);
        self
    }

    /// Render `name=value` pairs, used by debug snapshots.
    pub fn render(&self, schema: &Schema) -> String {
        schema
            .fields()
            .iter()
            .zip(&self.values)
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A record diverted away from the main flow.
#[derive(Debug, Clone, PartialEq)]
pub struct TrapRecord {
    pub record: Record,
    pub stage: &'static str,
    pub reason: String,
}

impl TrapRecord {
    pub fn new(record: Record, stage: &'static str, reason: impl Into<String>) -> Self {
        Self {
            record,
            stage,
            reason: reason.into(),
        }
    }

    /// The `trap_reason` column value: `<stage>: <reason>`.
    pub fn reason_cell(&self) -> String {
        format!("{}: {}", self.stage, self.reason)
    }
}

/// Outcome of pushing one record through a per-record stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    Pass(Record),
    Trapped(TrapRecord),
}

/// The closed set of model families a definition may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Tree,
    Regression,
    Clustering,
    GeneralizedRegression,
    Mining,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 5] = [
        ModelFamily::Tree,
        ModelFamily::Regression,
        ModelFamily::Clustering,
        ModelFamily::GeneralizedRegression,
        ModelFamily::Mining,
    ];

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelFamily::Tree => "TreeModel",
            ModelFamily::Regression => "RegressionModel",
            ModelFamily::Clustering => "ClusteringModel",
            ModelFamily::GeneralizedRegression => "GeneralRegressionModel",
            ModelFamily::Mining => "MiningModel",
        }
    }
}

impl FromStr for ModelFamily {
    type Err = PatternError;

    /// Accepts both the snake-case tag and the interchange element name.
    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "tree" | "TreeModel" => Ok(ModelFamily::Tree),
            "regression" | "RegressionModel" => Ok(ModelFamily::Regression),
            "clustering" | "ClusteringModel" => Ok(ModelFamily::Clustering),
            "generalized_regression" | "GeneralRegressionModel" => {
                Ok(ModelFamily::GeneralizedRegression)
            }
            "mining" | "ensemble" | "MiningModel" => Ok(ModelFamily::Mining),
            other => Err(PatternError::UnsupportedModelFamily {
                family: other.to_string(),
            }),
        }
    }
}

/// Enforcement level of the validation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    /// Record the match flag only.
    Lenient,
    /// Count every mismatch as an assertion violation and fail the run.
    Strict,
}

/// Default name of the appended prediction field.
pub const DEFAULT_SCORE_FIELD: &str = "score";
/// Default name of the expected-value field used by both measure modes.
pub const DEFAULT_EXPECTED_FIELD: &str = "predict";
/// Default name of the validation match flag.
pub const DEFAULT_MATCH_FIELD: &str = "match";
/// Column appended to every trapped row.
pub const TRAP_REASON_FIELD: &str = "trap_reason";
/// Default number of records processed per parallel batch.
pub const DEFAULT_BATCH_SIZE: usize = 4096;

/// A full run's configuration as understood by the builder and the runner.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub trap: PathBuf,
    /// Model definition; without one records pass through unscored.
    pub model: Option<PathBuf>,
    /// Enables confusion-matrix measurement; the table is written here.
    pub validation_source: Option<PathBuf>,
    /// Enables RMSE measurement; the table is written here.
    pub error_source: Option<PathBuf>,
    pub debug: bool,
    pub assert: bool,

    pub score_field: String,
    pub expected_field: String,
    pub match_field: String,
    /// RMSE grouping key; defaults to the model's target field.
    pub group_field: Option<String>,

    pub delimiter: u8,
    pub batch_size: usize,

    pub dot: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

impl FlowConfig {
    /// A config with every optional feature off, reading and writing the
    /// given locations.
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, trap: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            trap: trap.into(),
            model: None,
            validation_source: None,
            error_source: None,
            debug: false,
            assert: false,
            score_field: DEFAULT_SCORE_FIELD.to_string(),
            expected_field: DEFAULT_EXPECTED_FIELD.to_string(),
            match_field: DEFAULT_MATCH_FIELD.to_string(),
            group_field: None,
            delimiter: b'\t',
            batch_size: DEFAULT_BATCH_SIZE,
            dot: None,
            report: None,
        }
    }

    pub fn enforcement(&self) -> Enforcement {
        if self.assert {
            Enforcement::Strict
        } else {
            Enforcement::Lenient
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_rejects_duplicates() {
        let err = Schema::new(["a", "b", "a"]).unwrap_err();
        assert!(matches!(err, PatternError::FieldCollision { field } if field == "a"));
    }

    #[test]
    fn label_eq_numeric_and_text() {
        assert!(Value::from("1").label_eq(&Value::Number(1.0)));
        assert!(Value::from("A").label_eq(&Value::from("A")));
        assert!(!Value::from("a").label_eq(&Value::from("A")));
        assert!(!Value::Null.label_eq(&Value::Null));
    }

    #[test]
    fn family_tags_are_closed() {
        for family in ModelFamily::ALL {
            assert_eq!(family.display_name().parse::<ModelFamily>().unwrap(), family);
        }
        let err = "NeuralNetwork".parse::<ModelFamily>().unwrap_err();
        assert!(err.to_string().contains("NeuralNetwork"));
    }
}
