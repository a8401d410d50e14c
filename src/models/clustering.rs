//! Center-based clustering: assign each record to its nearest cluster.

use serde::Deserialize;

use crate::domain::{Record, Schema, Value};
use crate::error::PatternError;
use crate::models::{ModelDescriptor, numeric, push_field};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Measure {
    #[default]
    Euclidean,
    SquaredEuclidean,
    CityBlock,
}

impl Measure {
    fn distance(self, x: &[f64], center: &[f64]) -> f64 {
        let pairs = x.iter().zip(center);
        match self {
            Measure::Euclidean => pairs.map(|(a, b)| (a - b).powi(2)).sum::<f64>().sqrt(),
            Measure::SquaredEuclidean => pairs.map(|(a, b)| (a - b).powi(2)).sum(),
            Measure::CityBlock => pairs.map(|(a, b)| (a - b).abs()).sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Cluster {
    pub name: String,
    pub center: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClusteringModel {
    #[serde(default)]
    measure: Measure,
    clusters: Vec<Cluster>,
    /// Center coordinates are ordered like the definition's active fields.
    #[serde(skip)]
    fields: Vec<String>,
}

impl ClusteringModel {
    pub fn from_descriptor(descriptor: &ModelDescriptor) -> Result<Self, PatternError> {
        let mut model: ClusteringModel = descriptor.params()?;
        if model.clusters.is_empty() {
            return Err(PatternError::malformed("clustering model has no clusters"));
        }
        let dims = descriptor.active_fields.len();
        if let Some(bad) = model.clusters.iter().find(|c| c.center.len() != dims) {
            return Err(PatternError::malformed(format!(
                "cluster `{}` has {} coordinates, model declares {dims} fields",
                bad.name,
                bad.center.len()
            )));
        }
        model.fields = descriptor.active_fields.clone();
        Ok(model)
    }

    pub fn collect_fields(&self, out: &mut Vec<String>) {
        for name in &self.fields {
            push_field(out, name);
        }
    }

    pub fn score(&self, record: &Record, schema: &Schema) -> Result<Value, String> {
        let x = self
            .fields
            .iter()
            .map(|name| numeric(record, schema, name))
            .collect::<Result<Vec<f64>, String>>()?;

        // Ties go to the first cluster in definition order.
        let mut best: Option<(f64, &str)> = None;
        for cluster in &self.clusters {
            let d = self.measure.distance(&x, &cluster.center);
            if best.is_none_or(|(b, _)| d < b) {
                best = Some((d, cluster.name.as_str()));
            }
        }
        best.map(|(_, name)| Value::from(name))
            .ok_or_else(|| "clustering model has no clusters".to_string())
    }
}
