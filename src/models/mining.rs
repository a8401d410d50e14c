//! Ensembles ("mining models"): segments of member models combined per record.
//!
//! Each segment pairs a predicate with a nested model definition. Members are
//! built through [`ScoringModel::from_descriptor`], so a nested definition with
//! an unsupported family fails the whole load.

use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::{Record, Schema, Value};
use crate::error::PatternError;
use crate::models::{ModelDescriptor, Predicate, ScoringModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum MultipleModelMethod {
    #[default]
    SelectFirst,
    MajorityVote,
    Average,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    #[serde(default)]
    predicate: Predicate,
    model: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawMining {
    #[serde(default)]
    method: MultipleModelMethod,
    segments: Vec<RawSegment>,
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub predicate: Predicate,
    pub model: ScoringModel,
}

#[derive(Debug, Clone)]
pub struct MiningModel {
    method: MultipleModelMethod,
    segments: Vec<Segment>,
}

impl MiningModel {
    pub fn from_descriptor(descriptor: &ModelDescriptor) -> Result<Self, PatternError> {
        let raw: RawMining = descriptor.params()?;
        if raw.segments.is_empty() {
            return Err(PatternError::malformed("mining model has no segments"));
        }
        let segments = raw
            .segments
            .into_iter()
            .map(|seg| {
                let member = ModelDescriptor::from_value(seg.model)?;
                Ok(Segment {
                    predicate: seg.predicate,
                    model: ScoringModel::from_descriptor(&member)?,
                })
            })
            .collect::<Result<Vec<_>, PatternError>>()?;
        Ok(Self {
            method: raw.method,
            segments,
        })
    }

    /// Fields read by segment predicates and by every member model.
    pub fn collect_fields(&self, out: &mut Vec<String>) {
        for segment in &self.segments {
            segment.predicate.collect_fields(out);
            segment.model.collect_fields(out);
        }
    }

    pub fn prepare(&mut self) {
        for segment in &mut self.segments {
            segment.model.prepare();
        }
    }

    pub fn score(&self, record: &Record, schema: &Schema) -> Result<Value, String> {
        let mut outputs = Vec::new();
        for segment in &self.segments {
            if !segment.predicate.evaluate(record, schema)? {
                continue;
            }
            let value = segment.model.score(record, schema)?;
            if self.method == MultipleModelMethod::SelectFirst {
                return Ok(value);
            }
            outputs.push(value);
        }
        if outputs.is_empty() {
            return Err("no ensemble segment applies to the record".to_string());
        }

        match self.method {
            MultipleModelMethod::SelectFirst => Err("no ensemble segment applies to the record".to_string()),
            MultipleModelMethod::Average => {
                let mut sum = 0.0;
                for v in &outputs {
                    sum += v
                        .as_f64()
                        .ok_or_else(|| format!("segment output '{v}' cannot be averaged"))?;
                }
                Ok(Value::Number(sum / outputs.len() as f64))
            }
            MultipleModelMethod::MajorityVote => {
                // Ties go to the label seen first.
                let mut votes: HashMap<String, (usize, usize)> = HashMap::new();
                for (order, v) in outputs.iter().enumerate() {
                    votes.entry(v.to_string()).or_insert((0, order)).0 += 1;
                }
                let winner = votes
                    .into_iter()
                    .max_by(|(_, (ca, oa)), (_, (cb, ob))| ca.cmp(cb).then(ob.cmp(oa)))
                    .map(|(label, _)| label)
                    .unwrap_or_default();
                Ok(Value::Text(winner))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ensemble(method: &str) -> MiningModel {
        let json = format!(
            r#"{{"family":"MiningModel","target":"y","fields":["x"],"model":{{
                "method":"{method}",
                "segments":[
                  {{"model":{{"family":"regression","target":"y","fields":["x"],
                     "model":{{"tables":[{{"intercept":1.0}}]}}}}}},
                  {{"model":{{"family":"regression","target":"y","fields":["x"],
                     "model":{{"tables":[{{"intercept":3.0}}]}}}}}},
                  {{"predicate":{{"kind":"false"}},
                    "model":{{"family":"regression","target":"y","fields":["x"],
                     "model":{{"tables":[{{"intercept":100.0}}]}}}}}}
                ]}}}}"#
        );
        let descriptor = ModelDescriptor::from_json_str(&json).unwrap();
        let mut model = MiningModel::from_descriptor(&descriptor).unwrap();
        model.prepare();
        model
    }

    #[test]
    fn combines_applicable_segments() {
        let schema = Schema::new(["x"]).unwrap();
        let record = Record::new(vec![Value::from("0")]);
        assert_eq!(ensemble("average").score(&record, &schema), Ok(Value::Number(2.0)));
        assert_eq!(ensemble("selectFirst").score(&record, &schema), Ok(Value::Number(1.0)));
        assert_eq!(ensemble("majorityVote").score(&record, &schema), Ok(Value::from("1")));
    }

    #[test]
    fn nested_unsupported_family_fails_load() {
        let descriptor = ModelDescriptor::from_json_str(
            r#"{"family":"mining","target":"y","model":{"segments":[
                {"model":{"family":"SupportVectorMachineModel","target":"y"}}]}}"#,
        )
        .unwrap();
        let err = MiningModel::from_descriptor(&descriptor).unwrap_err();
        assert!(matches!(err, PatternError::UnsupportedModelFamily { .. }));
    }
}
