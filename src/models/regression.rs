//! Linear regression scoring.
//!
//! A regression model is one or more tables of the form
//! `intercept + Σ coef·x^exp + Σ coef·[field == value]`.
//!
//! - one table: numeric prediction, optionally passed through a normalization
//! - several tables: classification; the label of the best-scoring table wins

use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::{Record, Schema, Value};
use crate::error::PatternError;
use crate::models::{ModelDescriptor, field, numeric, push_field};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NumericPredictor {
    pub name: String,
    #[serde(default = "default_exponent")]
    pub exponent: i32,
    pub coefficient: f64,
}

fn default_exponent() -> i32 {
    1
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategoricalPredictor {
    pub name: String,
    pub value: String,
    pub coefficient: f64,
}

/// The shared linear term used by regression tables and GLMs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LinearPredictor {
    #[serde(default)]
    pub intercept: f64,
    #[serde(default)]
    pub numeric: Vec<NumericPredictor>,
    #[serde(default)]
    pub categorical: Vec<CategoricalPredictor>,
    /// field -> category -> coefficient, built by `prepare`.
    #[serde(skip)]
    lookup: HashMap<String, HashMap<String, f64>>,
}

impl LinearPredictor {
    pub fn collect_fields(&self, out: &mut Vec<String>) {
        for p in &self.numeric {
            push_field(out, &p.name);
        }
        for p in &self.categorical {
            push_field(out, &p.name);
        }
    }

    pub fn prepare(&mut self) {
        let mut lookup: HashMap<String, HashMap<String, f64>> = HashMap::new();
        for p in &self.categorical {
            *lookup
                .entry(p.name.clone())
                .or_default()
                .entry(p.value.clone())
                .or_insert(0.0) += p.coefficient;
        }
        self.lookup = lookup;
    }

    /// Evaluate the linear term. Categories without a coefficient contribute 0.
    pub fn evaluate(&self, record: &Record, schema: &Schema) -> Result<f64, String> {
        let mut y = self.intercept;
        for p in &self.numeric {
            let x = numeric(record, schema, &p.name)?;
            y += p.coefficient * x.powi(p.exponent);
        }
        for (name, coefficients) in &self.lookup {
            let value = field(record, schema, name)?;
            if value.is_null() {
                return Err(format!("field `{name}` is empty"));
            }
            y += coefficients.get(&value.to_string()).copied().unwrap_or(0.0);
        }
        if y.is_finite() {
            Ok(y)
        } else {
            Err("non-finite linear predictor".to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegressionTable {
    #[serde(default)]
    pub target_category: Option<String>,
    #[serde(flatten)]
    pub predictor: LinearPredictor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    #[default]
    None,
    Logit,
    Exp,
    /// Only meaningful for classification; monotone, so the winner is the same.
    Softmax,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegressionModel {
    #[serde(default)]
    normalization: Normalization,
    tables: Vec<RegressionTable>,
}

impl RegressionModel {
    pub fn from_descriptor(descriptor: &ModelDescriptor) -> Result<Self, PatternError> {
        let model: RegressionModel = descriptor.params()?;
        match model.tables.len() {
            0 => return Err(PatternError::malformed("regression model has no tables")),
            1 => {}
            _ => {
                if model.tables.iter().any(|t| t.target_category.is_none()) {
                    return Err(PatternError::malformed(
                        "classification regression tables must each name a `target_category`",
                    ));
                }
            }
        }
        Ok(model)
    }

    pub fn collect_fields(&self, out: &mut Vec<String>) {
        for table in &self.tables {
            table.predictor.collect_fields(out);
        }
    }

    pub fn prepare(&mut self) {
        for table in &mut self.tables {
            table.predictor.prepare();
        }
    }

    pub fn score(&self, record: &Record, schema: &Schema) -> Result<Value, String> {
        if let [table] = self.tables.as_slice() {
            let y = table.predictor.evaluate(record, schema)?;
            let y = match self.normalization {
                Normalization::None | Normalization::Softmax => y,
                Normalization::Logit => 1.0 / (1.0 + (-y).exp()),
                Normalization::Exp => y.exp(),
            };
            return Ok(Value::Number(y));
        }

        let mut best: Option<(f64, &str)> = None;
        for table in &self.tables {
            let y = table.predictor.evaluate(record, schema)?;
            let label = table.target_category.as_deref().unwrap_or_default();
            if best.is_none_or(|(b, _)| y > b) {
                best = Some((y, label));
            }
        }
        best.map(|(_, label)| Value::from(label))
            .ok_or_else(|| "regression model has no tables".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(json: &str) -> RegressionModel {
        let descriptor = ModelDescriptor::from_json_str(json).unwrap();
        let mut model = RegressionModel::from_descriptor(&descriptor).unwrap();
        model.prepare();
        model
    }

    #[test]
    fn numeric_prediction_with_categories() {
        let model = load(
            r#"{"family":"regression","target":"price","fields":["size","city"],"model":{
                "tables":[{"intercept":10.0,
                    "numeric":[{"name":"size","coefficient":2.0}],
                    "categorical":[{"name":"city","value":"paris","coefficient":5.0}]}]}}"#,
        );
        let schema = Schema::new(["size", "city"]).unwrap();
        let paris = Record::new(vec![Value::from("3"), Value::from("paris")]);
        let lyon = Record::new(vec![Value::from("3"), Value::from("lyon")]);
        assert_eq!(model.score(&paris, &schema), Ok(Value::Number(21.0)));
        assert_eq!(model.score(&lyon, &schema), Ok(Value::Number(16.0)));
    }

    #[test]
    fn classification_picks_best_table() {
        let model = load(
            r#"{"family":"regression","target":"label","fields":["x"],"model":{
                "normalization":"softmax",
                "tables":[
                    {"target_category":"low","intercept":1.0,"numeric":[{"name":"x","coefficient":-1.0}]},
                    {"target_category":"high","intercept":-1.0,"numeric":[{"name":"x","coefficient":1.0}]}
                ]}}"#,
        );
        let schema = Schema::new(["x"]).unwrap();
        assert_eq!(model.score(&Record::new(vec![Value::from("5")]), &schema), Ok(Value::from("high")));
        assert_eq!(model.score(&Record::new(vec![Value::from("-5")]), &schema), Ok(Value::from("low")));
    }

    #[test]
    fn non_numeric_input_fails() {
        let model = load(
            r#"{"family":"regression","target":"y","fields":["x"],"model":{
                "tables":[{"numeric":[{"name":"x","coefficient":1.0}]}]}}"#,
        );
        let schema = Schema::new(["x"]).unwrap();
        let err = model.score(&Record::new(vec![Value::from("abc")]), &schema).unwrap_err();
        assert!(err.contains("not numeric"));
    }
}
