//! Generalized linear models: a linear predictor passed through an inverse link.

use serde::Deserialize;

use crate::domain::{Record, Schema, Value};
use crate::error::PatternError;
use crate::models::ModelDescriptor;
use crate::models::regression::LinearPredictor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkFunction {
    #[default]
    Identity,
    Log,
    Logit,
    Inverse,
}

impl LinkFunction {
    /// Map the linear predictor `eta` back to the response scale.
    pub fn inverse(self, eta: f64) -> f64 {
        match self {
            LinkFunction::Identity => eta,
            LinkFunction::Log => eta.exp(),
            LinkFunction::Logit => 1.0 / (1.0 + (-eta).exp()),
            LinkFunction::Inverse => 1.0 / eta,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneralizedRegressionModel {
    #[serde(default)]
    link: LinkFunction,
    #[serde(flatten)]
    predictor: LinearPredictor,
}

impl GeneralizedRegressionModel {
    pub fn from_descriptor(descriptor: &ModelDescriptor) -> Result<Self, PatternError> {
        descriptor.params()
    }

    pub fn collect_fields(&self, out: &mut Vec<String>) {
        self.predictor.collect_fields(out);
    }

    pub fn prepare(&mut self) {
        self.predictor.prepare();
    }

    pub fn score(&self, record: &Record, schema: &Schema) -> Result<Value, String> {
        let eta = self.predictor.evaluate(record, schema)?;
        let mu = self.link.inverse(eta);
        if !mu.is_finite() {
            return Err(format!("{:?} link produced a non-finite value for eta={eta}", self.link));
        }
        Ok(Value::Number(mu))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logit_link() {
        let descriptor = ModelDescriptor::from_json_str(
            r#"{"family":"GeneralRegressionModel","target":"p","fields":["x"],"model":{
                "link":"logit","intercept":0.0,"numeric":[{"name":"x","coefficient":1.0}]}}"#,
        )
        .unwrap();
        let mut model = GeneralizedRegressionModel::from_descriptor(&descriptor).unwrap();
        model.prepare();
        let schema = Schema::new(["x"]).unwrap();
        let p = model.score(&Record::new(vec![Value::from("0")]), &schema).unwrap();
        assert_eq!(p, Value::Number(0.5));
    }

    #[test]
    fn inverse_link_at_zero_fails() {
        let descriptor = ModelDescriptor::from_json_str(
            r#"{"family":"generalized_regression","target":"y","fields":["x"],"model":{
                "link":"inverse","numeric":[{"name":"x","coefficient":1.0}]}}"#,
        )
        .unwrap();
        let mut model = GeneralizedRegressionModel::from_descriptor(&descriptor).unwrap();
        model.prepare();
        let schema = Schema::new(["x"]).unwrap();
        assert!(model.score(&Record::new(vec![Value::from("0")]), &schema).is_err());
    }
}
