//! Per-record stages.
//!
//! Every stage resolves the field positions it needs against its upstream
//! schema when it is built, so a missing dependency is reported before any
//! record is read. At run time stages only append values; they never rewrite
//! an existing one.

use crate::domain::{Enforcement, Record, Routed, Schema, TrapRecord, Value};
use crate::error::{PatternError, RecordError};
use crate::models::Classifier;

fn index(schema: &Schema, stage: &str, field: &str) -> Result<usize, PatternError> {
    schema.index_of(field).ok_or_else(|| PatternError::MissingField {
        stage: stage.to_string(),
        field: field.to_string(),
    })
}

/// Appends the model's prediction to each record.
#[derive(Debug, Clone)]
pub struct ScoringStage {
    classifier: Classifier,
    input: Schema,
    output: Schema,
}

impl ScoringStage {
    pub const NAME: &'static str = "score";

    pub fn new(classifier: Classifier, upstream: &Schema, output_field: &str) -> Result<Self, PatternError> {
        upstream.require(Self::NAME, classifier.input_fields())?;
        let output = upstream.clone().with_field(output_field)?;
        Ok(Self {
            classifier,
            input: upstream.clone(),
            output,
        })
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn output_schema(&self) -> &Schema {
        &self.output
    }

    pub fn prepare(&mut self) {
        self.classifier.prepare();
    }

    /// Score one record. Scoring failures are trapped; only lifecycle errors
    /// escape.
    pub fn apply(&self, record: Record) -> Result<Routed, PatternError> {
        match self.classifier.classify(&record, &self.input) {
            Ok(label) => Ok(Routed::Pass(record.appended(label))),
            Err(PatternError::Record(RecordError::Scoring { record, reason })) => {
                Ok(Routed::Trapped(TrapRecord::new(record, Self::NAME, reason)))
            }
            Err(PatternError::Record(other)) => Ok(Routed::Trapped(TrapRecord::new(
                record,
                Self::NAME,
                other.to_string(),
            ))),
            Err(fatal) => Err(fatal),
        }
    }
}

/// Compares predicted and expected values and appends a match flag.
#[derive(Debug, Clone)]
pub struct ValidationStage {
    predicted: usize,
    expected: usize,
    expected_field: String,
    enforcement: Enforcement,
    output: Schema,
}

impl ValidationStage {
    pub const NAME: &'static str = "validate";

    pub fn new(
        upstream: &Schema,
        predicted_field: &str,
        expected_field: &str,
        match_field: &str,
        enforcement: Enforcement,
    ) -> Result<Self, PatternError> {
        let predicted = index(upstream, Self::NAME, predicted_field)?;
        let expected = index(upstream, Self::NAME, expected_field)?;
        let output = upstream.clone().with_field(match_field)?;
        Ok(Self {
            predicted,
            expected,
            expected_field: expected_field.to_string(),
            enforcement,
            output,
        })
    }

    pub fn enforcement(&self) -> Enforcement {
        self.enforcement
    }

    pub fn output_schema(&self) -> &Schema {
        &self.output
    }

    /// Check one record; returns the routed record and whether it matched.
    ///
    /// An empty expected value is an input-level failure and is trapped.
    pub fn apply(&self, record: Record) -> (Routed, bool) {
        let expected = &record.values()[self.expected];
        if expected.is_null() {
            let reason = RecordError::MissingValue {
                field: self.expected_field.clone(),
            };
            return (
                Routed::Trapped(TrapRecord::new(record, Self::NAME, reason.to_string())),
                false,
            );
        }
        let matched = record.values()[self.predicted].label_eq(expected);
        (Routed::Pass(record.appended(Value::from(matched))), matched)
    }

    /// Whether a mismatch counts as an assertion violation.
    pub fn is_violation(&self, matched: bool) -> bool {
        !matched && self.enforcement == Enforcement::Strict
    }
}

/// Extracts the (expected, predicted) grouping key from validated records.
#[derive(Debug, Clone)]
pub struct ConfusionStage {
    expected: usize,
    predicted: usize,
    output: Schema,
}

impl ConfusionStage {
    pub const NAME: &'static str = "confusion";

    pub fn new(upstream: &Schema, expected_field: &str, predicted_field: &str) -> Result<Self, PatternError> {
        let expected = index(upstream, Self::NAME, expected_field)?;
        let predicted = index(upstream, Self::NAME, predicted_field)?;
        let output = Schema::new([expected_field, predicted_field, "count"])?;
        Ok(Self {
            expected,
            predicted,
            output,
        })
    }

    /// The (expected, predicted) cell for a validated record.
    ///
    /// A prediction the validation stage accepted lands on the diagonal under
    /// the expected label, so `"1.0"` vs `1` is one cell, not two.
    pub fn key(&self, record: &Record, matched: bool) -> (String, String) {
        let expected = record.values()[self.expected].to_string();
        let predicted = if matched {
            expected.clone()
        } else {
            record.values()[self.predicted].to_string()
        };
        (expected, predicted)
    }

    pub fn output_schema(&self) -> &Schema {
        &self.output
    }
}

/// Computes the squared prediction error and the group it belongs to.
#[derive(Debug, Clone)]
pub struct ErrorStage {
    predicted: usize,
    expected: usize,
    group: usize,
    predicted_field: String,
    expected_field: String,
    output: Schema,
}

impl ErrorStage {
    pub const NAME: &'static str = "rmse";

    pub fn new(
        upstream: &Schema,
        predicted_field: &str,
        expected_field: &str,
        group_field: &str,
    ) -> Result<Self, PatternError> {
        let predicted = index(upstream, Self::NAME, predicted_field)?;
        let expected = index(upstream, Self::NAME, expected_field)?;
        let group = index(upstream, Self::NAME, group_field)?;
        let output = Schema::new([group_field, "rmse", "count"])?;
        Ok(Self {
            predicted,
            expected,
            group,
            predicted_field: predicted_field.to_string(),
            expected_field: expected_field.to_string(),
            output,
        })
    }

    pub fn output_schema(&self) -> &Schema {
        &self.output
    }

    /// `(group key, (predicted - expected)^2)` for one record.
    pub fn squared_error(&self, record: &Record) -> Result<(String, f64), RecordError> {
        let predicted = coerce(&record.values()[self.predicted], &self.predicted_field)?;
        let expected = coerce(&record.values()[self.expected], &self.expected_field)?;
        let diff = predicted - expected;
        Ok((record.values()[self.group].to_string(), diff * diff))
    }
}

fn coerce(value: &Value, field: &str) -> Result<f64, RecordError> {
    value.as_f64().ok_or_else(|| RecordError::NonNumericField {
        field: field.to_string(),
        value: value.to_string(),
    })
}
