//! Boolean predicates over record fields.
//!
//! Used by tree nodes to choose a branch and by ensemble segments to decide
//! whether a member model applies to a record.

use serde::Deserialize;

use crate::domain::{Record, Schema, Value};
use crate::models::{field, push_field};

/// Comparison operators for a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SimpleOperator {
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    IsMissing,
    IsNotMissing,
}

/// Set membership operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SetOperator {
    IsIn,
    IsNotIn,
}

/// Connectives for compound predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BooleanOperator {
    And,
    Or,
    Xor,
    /// First sub-predicate that can be evaluated decides.
    Surrogate,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    #[default]
    True,
    False,
    Simple {
        field: String,
        operator: SimpleOperator,
        #[serde(default)]
        value: Option<Value>,
    },
    SimpleSet {
        field: String,
        operator: SetOperator,
        values: Vec<String>,
    },
    Compound {
        operator: BooleanOperator,
        predicates: Vec<Predicate>,
    },
}

impl Predicate {
    /// Every field this predicate (and its children) reads.
    pub fn collect_fields(&self, out: &mut Vec<String>) {
        match self {
            Predicate::True | Predicate::False => {}
            Predicate::Simple { field, .. } | Predicate::SimpleSet { field, .. } => push_field(out, field),
            Predicate::Compound { predicates, .. } => {
                for p in predicates {
                    p.collect_fields(out);
                }
            }
        }
    }

    /// Evaluate against a record.
    ///
    /// Errors carry a human-readable reason (absent field, empty value,
    /// non-numeric operand for an ordering comparison).
    pub fn evaluate(&self, record: &Record, schema: &Schema) -> Result<bool, String> {
        match self {
            Predicate::True => Ok(true),
            Predicate::False => Ok(false),
            Predicate::Simple {
                field: name,
                operator,
                value,
            } => {
                let actual = field(record, schema, name)?;
                match operator {
                    SimpleOperator::IsMissing => return Ok(actual.is_null()),
                    SimpleOperator::IsNotMissing => return Ok(!actual.is_null()),
                    _ => {}
                }
                if actual.is_null() {
                    return Err(format!("field `{name}` is empty"));
                }
                let expected = value
                    .as_ref()
                    .ok_or_else(|| format!("predicate on `{name}` has no comparison value"))?;
                compare(name, *operator, actual, expected)
            }
            Predicate::SimpleSet {
                field: name,
                operator,
                values,
            } => {
                let actual = field(record, schema, name)?;
                if actual.is_null() {
                    return Err(format!("field `{name}` is empty"));
                }
                let rendered = actual.to_string();
                let member = values.iter().any(|v| *v == rendered);
                Ok(match operator {
                    SetOperator::IsIn => member,
                    SetOperator::IsNotIn => !member,
                })
            }
            Predicate::Compound {
                operator,
                predicates,
            } => match operator {
                BooleanOperator::And => {
                    for p in predicates {
                        if !p.evaluate(record, schema)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                BooleanOperator::Or => {
                    for p in predicates {
                        if p.evaluate(record, schema)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                BooleanOperator::Xor => {
                    let mut acc = false;
                    for p in predicates {
                        acc ^= p.evaluate(record, schema)?;
                    }
                    Ok(acc)
                }
                BooleanOperator::Surrogate => {
                    let mut last_err = "surrogate predicate has no alternatives".to_string();
                    for p in predicates {
                        match p.evaluate(record, schema) {
                            Ok(v) => return Ok(v),
                            Err(e) => last_err = e,
                        }
                    }
                    Err(last_err)
                }
            },
        }
    }
}

fn compare(name: &str, op: SimpleOperator, actual: &Value, expected: &Value) -> Result<bool, String> {
    if let (Some(a), Some(b)) = (actual.as_f64(), expected.as_f64()) {
        return Ok(match op {
            SimpleOperator::Equal => a == b,
            SimpleOperator::NotEqual => a != b,
            SimpleOperator::LessThan => a < b,
            SimpleOperator::LessOrEqual => a <= b,
            SimpleOperator::GreaterThan => a > b,
            SimpleOperator::GreaterOrEqual => a >= b,
            SimpleOperator::IsMissing => actual.is_null(),
            SimpleOperator::IsNotMissing => !actual.is_null(),
        });
    }
    match op {
        SimpleOperator::Equal => Ok(actual.to_string() == expected.to_string()),
        SimpleOperator::NotEqual => Ok(actual.to_string() != expected.to_string()),
        _ => Err(format!("field `{name}` is not numeric: '{actual}'")),
    }
}
