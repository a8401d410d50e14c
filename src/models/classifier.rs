//! The model loader and its prepare/classify lifecycle.

use std::path::Path;

use tracing::{debug, info};

use crate::domain::{ModelFamily, Record, Schema, Value};
use crate::error::PatternError;
use crate::models::{ModelDescriptor, ScoringModel};

/// A loaded model ready to be wired into a scoring stage.
///
/// `prepare` must run once before `classify`; after that the classifier is
/// read-only and can be shared across worker threads.
#[derive(Debug, Clone)]
pub struct Classifier {
    descriptor: ModelDescriptor,
    model: ScoringModel,
    /// Declared fields plus every field the model actually reads.
    inputs: Vec<String>,
    prepared: bool,
}

impl Classifier {
    /// Read a definition file and build the matching model.
    pub fn load(path: &Path) -> Result<Self, PatternError> {
        let descriptor = crate::io::read_model_definition(path)?;
        let classifier = Self::from_descriptor(descriptor)?;
        info!(
            path = %path.display(),
            family = classifier.family().display_name(),
            target = %classifier.target(),
            "loaded model definition"
        );
        Ok(classifier)
    }

    pub fn from_json_str(text: &str) -> Result<Self, PatternError> {
        Self::from_descriptor(ModelDescriptor::from_json_str(text)?)
    }

    pub fn from_descriptor(descriptor: ModelDescriptor) -> Result<Self, PatternError> {
        let model = ScoringModel::from_descriptor(&descriptor)?;
        let mut inputs = descriptor.active_fields.clone();
        model.collect_fields(&mut inputs);
        Ok(Self {
            descriptor,
            inputs,
            model,
            prepared: false,
        })
    }

    pub fn family(&self) -> ModelFamily {
        self.model.family()
    }

    /// The field this model predicts.
    pub fn target(&self) -> &str {
        &self.descriptor.target
    }

    /// Fields every scored record must carry: the declared fields plus any
    /// field a predicate, predictor or ensemble member reads.
    pub fn input_fields(&self) -> &[String] {
        &self.inputs
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// One-time model setup. Later calls are no-ops.
    pub fn prepare(&mut self) {
        if self.prepared {
            debug!("classifier already prepared");
            return;
        }
        self.model.prepare();
        self.prepared = true;
    }

    /// Predict the label for one record.
    ///
    /// Per-record failures come back as [`PatternError::Record`];
    /// [`PatternError::NotPrepared`] means the lifecycle was violated.
    pub fn classify(&self, record: &Record, schema: &Schema) -> Result<Value, PatternError> {
        if !self.prepared {
            return Err(PatternError::NotPrepared);
        }
        Ok(self.model.classify(record, schema)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordError;

    const LINEAR: &str = r#"{"family":"regression","target":"y","fields":["x"],"model":{
        "tables":[{"intercept":1.0,"numeric":[{"name":"x","coefficient":2.0}]}]}}"#;

    #[test]
    fn classify_before_prepare_fails_fast() {
        let classifier = Classifier::from_json_str(LINEAR).unwrap();
        let schema = Schema::new(["x"]).unwrap();
        let err = classifier
            .classify(&Record::new(vec![Value::from("1")]), &schema)
            .unwrap_err();
        assert!(matches!(err, PatternError::NotPrepared));
    }

    #[test]
    fn classify_does_not_touch_the_record() {
        let mut classifier = Classifier::from_json_str(LINEAR).unwrap();
        assert!(!classifier.is_prepared());
        classifier.prepare();
        classifier.prepare();
        assert!(classifier.is_prepared());
        let schema = Schema::new(["x"]).unwrap();
        let record = Record::new(vec![Value::from("2")]);
        let before = record.clone();
        assert_eq!(classifier.classify(&record, &schema).unwrap(), Value::Number(5.0));
        assert_eq!(record, before);
    }

    #[test]
    fn scoring_error_carries_record() {
        let mut classifier = Classifier::from_json_str(LINEAR).unwrap();
        classifier.prepare();
        let schema = Schema::new(["x"]).unwrap();
        let record = Record::new(vec![Value::Null]);
        match classifier.classify(&record, &schema) {
            Err(PatternError::Record(RecordError::Scoring { record: r, reason })) => {
                assert_eq!(r, record);
                assert!(reason.contains("empty"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn input_fields_include_fields_the_model_reads() {
        let classifier = Classifier::from_json_str(
            r#"{"family":"mining","target":"y","fields":["id"],"model":{"segments":[
                {"predicate":{"kind":"compound","operator":"and","predicates":[
                    {"kind":"simple","field":"region","operator":"equal","value":"north"},
                    {"kind":"simple_set","field":"tier","operator":"isIn","values":["a"]}]},
                 "model":{"family":"tree","target":"y","model":{"nodes":[
                    {"id":"root","score":"x"},
                    {"id":"c","parent":"root","score":"z",
                     "predicate":{"kind":"simple","field":"depth","operator":"lessThan","value":3}}]}}},
                {"model":{"family":"regression","target":"y","model":{"tables":[
                    {"numeric":[{"name":"width","coefficient":1.0}],
                     "categorical":[{"name":"region","value":"south","coefficient":2.0}]}]}}}
            ]}}"#,
        )
        .unwrap();
        assert_eq!(classifier.input_fields(), ["id", "region", "tier", "depth", "width"]);
    }

    #[test]
    fn unsupported_family_never_builds_a_model() {
        for tag in ["NeuralNetwork", "svm", "Tree", ""] {
            let json = format!(r#"{{"family":"{tag}","target":"y"}}"#);
            let err = Classifier::from_json_str(&json).unwrap_err();
            assert!(
                matches!(&err, PatternError::UnsupportedModelFamily { family } if family == tag),
                "{tag}: {err}"
            );
        }
    }
}
