//! The closed set of scoring models.
//!
//! Construction dispatches on the definition's family tag with an exhaustive
//! `match`; scoring dispatches on the variant. Nothing outside
//! [`ModelFamily`] can be constructed.

use crate::domain::{ModelFamily, Record, Schema, Value};
use crate::error::{PatternError, RecordError};
use crate::models::clustering::ClusteringModel;
use crate::models::glm::GeneralizedRegressionModel;
use crate::models::mining::MiningModel;
use crate::models::regression::RegressionModel;
use crate::models::tree::TreeModel;
use crate::models::ModelDescriptor;

#[derive(Debug, Clone)]
pub enum ScoringModel {
    Tree(TreeModel),
    Regression(RegressionModel),
    Clustering(ClusteringModel),
    GeneralizedRegression(GeneralizedRegressionModel),
    Mining(MiningModel),
}

impl ScoringModel {
    /// Build the variant matching the descriptor's family.
    pub fn from_descriptor(descriptor: &ModelDescriptor) -> Result<Self, PatternError> {
        Ok(match descriptor.family {
            ModelFamily::Tree => ScoringModel::Tree(TreeModel::from_descriptor(descriptor)?),
            ModelFamily::Regression => {
                ScoringModel::Regression(RegressionModel::from_descriptor(descriptor)?)
            }
            ModelFamily::Clustering => {
                ScoringModel::Clustering(ClusteringModel::from_descriptor(descriptor)?)
            }
            ModelFamily::GeneralizedRegression => ScoringModel::GeneralizedRegression(
                GeneralizedRegressionModel::from_descriptor(descriptor)?,
            ),
            ModelFamily::Mining => ScoringModel::Mining(MiningModel::from_descriptor(descriptor)?),
        })
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            ScoringModel::Tree(_) => ModelFamily::Tree,
            ScoringModel::Regression(_) => ModelFamily::Regression,
            ScoringModel::Clustering(_) => ModelFamily::Clustering,
            ScoringModel::GeneralizedRegression(_) => ModelFamily::GeneralizedRegression,
            ScoringModel::Mining(_) => ModelFamily::Mining,
        }
    }

    /// Every field scoring can read, in first-use order.
    pub fn collect_fields(&self, out: &mut Vec<String>) {
        match self {
            ScoringModel::Tree(m) => m.collect_fields(out),
            ScoringModel::Regression(m) => m.collect_fields(out),
            ScoringModel::Clustering(m) => m.collect_fields(out),
            ScoringModel::GeneralizedRegression(m) => m.collect_fields(out),
            ScoringModel::Mining(m) => m.collect_fields(out),
        }
    }

    /// One-time setup before the first record.
    pub fn prepare(&mut self) {
        match self {
            ScoringModel::Tree(m) => m.prepare(),
            ScoringModel::Regression(m) => m.prepare(),
            ScoringModel::Clustering(_) => {}
            ScoringModel::GeneralizedRegression(m) => m.prepare(),
            ScoringModel::Mining(m) => m.prepare(),
        }
    }

    /// Score a record, returning the failure reason as text.
    pub fn score(&self, record: &Record, schema: &Schema) -> Result<Value, String> {
        match self {
            ScoringModel::Tree(m) => m.score(record, schema),
            ScoringModel::Regression(m) => m.score(record, schema),
            ScoringModel::Clustering(m) => m.score(record, schema),
            ScoringModel::GeneralizedRegression(m) => m.score(record, schema),
            ScoringModel::Mining(m) => m.score(record, schema),
        }
    }

    /// Score a record; failures carry the record for trapping.
    pub fn classify(&self, record: &Record, schema: &Schema) -> Result<Value, RecordError> {
        self.score(record, schema)
            .map_err(|reason| RecordError::scoring(record, reason))
    }
}
