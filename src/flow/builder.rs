//! Flow assembly.
//!
//! [`PipelineBuilder`] checks the configuration, wires the stages against the
//! source schema and returns an immutable [`Pipeline`]. Every schema gap and
//! configuration conflict surfaces here, before a single record is read.
//!
//! Topology:
//!
//! ```text
//! source ─> score ─> primary sink
//!             │
//!             ├─> validate ─> confusion ─> measure sink   (Confusion)
//!             └─> rmse ─────────────────> measure sink    (Rmse)
//! every stage ─> trap sink
//! ```

use tracing::{debug, info};

use crate::domain::{Enforcement, FlowConfig, Record, Routed, Schema, TRAP_REASON_FIELD, TrapRecord, Value};
use crate::domain::{DEFAULT_EXPECTED_FIELD, DEFAULT_MATCH_FIELD, DEFAULT_SCORE_FIELD};
use crate::error::PatternError;
use crate::flow::aggregate::{Aggregate, ConfusionMatrix, Contribution, RmseAggregate};
use crate::flow::stages::{ConfusionStage, ErrorStage, ScoringStage, ValidationStage};
use crate::models::Classifier;

/// Which measurement branch, if any, hangs off the scored records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureMode {
    None,
    /// Validate predictions and build a confusion matrix.
    Confusion,
    /// Compute RMSE per group.
    Rmse,
}

impl MeasureMode {
    /// Resolve the mode from the two optional measure locations.
    pub fn from_config(config: &FlowConfig) -> Result<Self, PatternError> {
        match (&config.validation_source, &config.error_source) {
            (Some(validation), Some(error)) => Err(PatternError::ConflictingAggregationMode {
                validation: validation.display().to_string(),
                error: error.display().to_string(),
            }),
            (Some(_), None) => Ok(MeasureMode::Confusion),
            (None, Some(_)) => Ok(MeasureMode::Rmse),
            (None, None) => Ok(MeasureMode::None),
        }
    }
}

/// The assembled measure branch.
#[derive(Debug, Clone)]
pub enum Branch {
    None,
    Confusion {
        validation: ValidationStage,
        confusion: ConfusionStage,
    },
    Rmse(ErrorStage),
}

impl Branch {
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Branch::None => None,
            Branch::Confusion { .. } => Some(ConfusionStage::NAME),
            Branch::Rmse(_) => Some(ErrorStage::NAME),
        }
    }
}

/// What one input record produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Processed {
    /// Record for the primary sink.
    pub primary: Option<Record>,
    pub traps: Vec<TrapRecord>,
    pub contribution: Option<Contribution>,
    /// Validation mismatch (any enforcement level).
    pub mismatch: bool,
    /// Mismatch under strict enforcement.
    pub violation: bool,
}

impl Processed {
    pub fn trapped(trap: TrapRecord) -> Self {
        Self {
            traps: vec![trap],
            ..Self::default()
        }
    }
}

/// An assembled, immutable flow.
#[derive(Debug, Clone)]
pub struct Pipeline {
    source: Schema,
    scoring: Option<ScoringStage>,
    primary: Schema,
    branch: Branch,
    trap: Schema,
    debug: bool,
}

impl Pipeline {
    pub fn source_schema(&self) -> &Schema {
        &self.source
    }

    /// Schema of records written to the primary sink.
    pub fn primary_schema(&self) -> &Schema {
        &self.primary
    }

    /// Schema of trapped rows: the source fields plus `trap_reason`.
    pub fn trap_schema(&self) -> &Schema {
        &self.trap
    }

    /// Schema of the measure table, if the flow has a measure branch.
    pub fn measure_schema(&self) -> Option<&Schema> {
        match &self.branch {
            Branch::None => None,
            Branch::Confusion { confusion, .. } => Some(confusion.output_schema()),
            Branch::Rmse(stage) => Some(stage.output_schema()),
        }
    }

    pub fn branch(&self) -> &Branch {
        &self.branch
    }

    pub fn enforcement(&self) -> Option<Enforcement> {
        match &self.branch {
            Branch::Confusion { validation, .. } => Some(validation.enforcement()),
            _ => None,
        }
    }

    /// Run the model's one-time setup.
    pub fn prepare(&mut self) {
        if let Some(scoring) = &mut self.scoring {
            scoring.prepare();
        }
    }

    /// A fresh aggregate for the measure branch.
    pub fn empty_aggregate(&self) -> Option<Aggregate> {
        match &self.branch {
            Branch::None => None,
            Branch::Confusion { .. } => Some(Aggregate::Confusion(ConfusionMatrix::default())),
            Branch::Rmse(_) => Some(Aggregate::Rmse(RmseAggregate::default())),
        }
    }

    /// Trapped row for the trap sink: the source fields plus the reason.
    ///
    /// Cells beyond the source width cannot be placed in a column; they are
    /// listed in the reason instead.
    pub fn trap_row(&self, trap: &TrapRecord) -> Record {
        let width = self.source.len();
        let mut reason = trap.reason_cell();
        let extra = trap.record.values().get(width..).unwrap_or_default();
        if !extra.is_empty() {
            let cells: Vec<String> = extra.iter().map(|v| format!("'{v}'")).collect();
            reason.push_str(&format!(
                " ({} extra cell(s) not in the header: {})",
                extra.len(),
                cells.join(", ")
            ));
        }
        let mut values = trap.record.values().to_vec();
        values.resize(width, Value::Null);
        Record::new(values).appended(Value::Text(reason))
    }

    /// Push one source record through every stage.
    ///
    /// Per-record failures end up in `traps`; only lifecycle errors are
    /// returned as `Err`.
    pub fn process(&self, record: Record) -> Result<Processed, PatternError> {
        let mut out = Processed::default();

        let scored = match &self.scoring {
            Some(stage) => match stage.apply(record)? {
                Routed::Pass(r) => r,
                Routed::Trapped(t) => return Ok(Processed::trapped(t)),
            },
            None => record,
        };
        self.snapshot(ScoringStage::NAME, &self.primary, &scored);

        match &self.branch {
            Branch::None => {}
            Branch::Confusion {
                validation,
                confusion,
            } => {
                let (routed, matched) = validation.apply(scored.clone());
                match routed {
                    Routed::Pass(checked) => {
                        self.snapshot(ValidationStage::NAME, validation.output_schema(), &checked);
                        out.mismatch = !matched;
                        out.violation = validation.is_violation(matched);
                        let (expected, predicted) = confusion.key(&checked, matched);
                        out.contribution = Some(Contribution::Confusion { expected, predicted });
                    }
                    Routed::Trapped(t) => out.traps.push(t),
                }
            }
            Branch::Rmse(stage) => match stage.squared_error(&scored) {
                Ok((group, value)) => {
                    out.contribution = Some(Contribution::SquaredError { group, value });
                }
                Err(e) => out
                    .traps
                    .push(TrapRecord::new(scored.clone(), ErrorStage::NAME, e.to_string())),
            },
        }

        out.primary = Some(scored);
        Ok(out)
    }

    fn snapshot(&self, stage: &str, schema: &Schema, record: &Record) {
        if self.debug {
            debug!(target: "pattern::snapshot", stage, record = %record.render(schema));
        }
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        let mut names = vec!["source"];
        if self.scoring.is_some() {
            names.push(ScoringStage::NAME);
        }
        match &self.branch {
            Branch::None => {}
            Branch::Confusion { .. } => {
                names.push(ValidationStage::NAME);
                names.push(ConfusionStage::NAME);
            }
            Branch::Rmse(_) => names.push(ErrorStage::NAME),
        }
        names
    }

    /// Render the flow as a Graphviz digraph.
    pub fn to_dot(&self) -> String {
        let mut edges: Vec<(&str, &str)> = Vec::new();
        let head = if self.scoring.is_some() {
            edges.push(("source", ScoringStage::NAME));
            edges.push((ScoringStage::NAME, "trap"));
            ScoringStage::NAME
        } else {
            "source"
        };
        edges.push((head, "primary"));
        match &self.branch {
            Branch::None => {}
            Branch::Confusion { .. } => {
                edges.push((head, ValidationStage::NAME));
                edges.push((ValidationStage::NAME, "trap"));
                edges.push((ValidationStage::NAME, ConfusionStage::NAME));
                edges.push((ConfusionStage::NAME, "measure"));
            }
            Branch::Rmse(_) => {
                edges.push((head, ErrorStage::NAME));
                edges.push((ErrorStage::NAME, "trap"));
                edges.push((ErrorStage::NAME, "measure"));
            }
        }

        let mut out = String::from("digraph classify {\n");
        for sink in ["primary", "trap", "measure"] {
            if edges.iter().any(|(_, to)| *to == sink) {
                out.push_str(&format!("  \"{sink}\" [shape=box];\n"));
            }
        }
        for (from, to) in edges {
            out.push_str(&format!("  \"{from}\" -> \"{to}\";\n"));
        }
        out.push_str("}\n");
        out
    }
}

/// Assembles a [`Pipeline`] from a source schema and options.
#[derive(Debug)]
pub struct PipelineBuilder {
    source: Schema,
    classifier: Option<Classifier>,
    mode: MeasureMode,
    score_field: String,
    expected_field: String,
    match_field: String,
    group_field: Option<String>,
    enforcement: Enforcement,
    debug: bool,
}

impl PipelineBuilder {
    pub fn new(source: Schema) -> Self {
        Self {
            source,
            classifier: None,
            mode: MeasureMode::None,
            score_field: DEFAULT_SCORE_FIELD.to_string(),
            expected_field: DEFAULT_EXPECTED_FIELD.to_string(),
            match_field: DEFAULT_MATCH_FIELD.to_string(),
            group_field: None,
            enforcement: Enforcement::Lenient,
            debug: false,
        }
    }

    /// Builder preloaded from a run configuration.
    ///
    /// Conflicting measure options are rejected before anything else.
    pub fn from_config(
        config: &FlowConfig,
        source: Schema,
        classifier: Option<Classifier>,
    ) -> Result<Self, PatternError> {
        let mode = MeasureMode::from_config(config)?;
        let mut builder = Self::new(source)
            .measure(mode)
            .score_field(&config.score_field)
            .expected_field(&config.expected_field)
            .match_field(&config.match_field)
            .enforcement(config.enforcement())
            .debug(config.debug);
        if let Some(group) = &config.group_field {
            builder = builder.group_field(group);
        }
        if let Some(classifier) = classifier {
            builder = builder.classifier(classifier);
        }
        Ok(builder)
    }

    pub fn classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn measure(mut self, mode: MeasureMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn score_field(mut self, name: &str) -> Self {
        self.score_field = name.to_string();
        self
    }

    pub fn expected_field(mut self, name: &str) -> Self {
        self.expected_field = name.to_string();
        self
    }

    pub fn match_field(mut self, name: &str) -> Self {
        self.match_field = name.to_string();
        self
    }

    pub fn group_field(mut self, name: &str) -> Self {
        self.group_field = Some(name.to_string());
        self
    }

    pub fn enforcement(mut self, enforcement: Enforcement) -> Self {
        self.enforcement = enforcement;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn build(self) -> Result<Pipeline, PatternError> {
        let trap = self.source.clone().with_field(TRAP_REASON_FIELD)?;

        let target = self.classifier.as_ref().map(|c| c.target().to_string());
        let scoring = match self.classifier {
            Some(classifier) => Some(ScoringStage::new(classifier, &self.source, &self.score_field)?),
            None => {
                debug!("no model configured; records pass through unscored");
                None
            }
        };
        let primary = scoring
            .as_ref()
            .map(|s| s.output_schema().clone())
            .unwrap_or_else(|| self.source.clone());

        let branch = match self.mode {
            MeasureMode::None => Branch::None,
            MeasureMode::Confusion => {
                let validation = ValidationStage::new(
                    &primary,
                    &self.score_field,
                    &self.expected_field,
                    &self.match_field,
                    self.enforcement,
                )?;
                let confusion =
                    ConfusionStage::new(validation.output_schema(), &self.expected_field, &self.score_field)?;
                Branch::Confusion {
                    validation,
                    confusion,
                }
            }
            MeasureMode::Rmse => {
                let group = self
                    .group_field
                    .or(target)
                    .ok_or(PatternError::MissingGroupField)?;
                Branch::Rmse(ErrorStage::new(&primary, &self.score_field, &self.expected_field, &group)?)
            }
        };

        let pipeline = Pipeline {
            source: self.source,
            scoring,
            primary,
            branch,
            trap,
            debug: self.debug,
        };
        info!(
            stages = %pipeline.stage_names().join(" -> "),
            enforcement = ?pipeline.enforcement(),
            debug = pipeline.debug,
            "assembled flow"
        );
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Value;

    fn regression() -> Classifier {
        Classifier::from_json_str(
            r#"{"family":"regression","target":"label","fields":["x"],"model":{
                "tables":[{"numeric":[{"name":"x","coefficient":1.0}]}]}}"#,
        )
        .unwrap()
    }

    #[test]
    fn both_measure_modes_conflict() {
        let mut config = FlowConfig::new("in.tsv", "out.tsv", "trap.tsv");
        config.validation_source = Some("measure.tsv".into());
        config.error_source = Some("rmse.tsv".into());
        for (debug, assert) in [(false, false), (true, false), (false, true), (true, true)] {
            config.debug = debug;
            config.assert = assert;
            let schema = Schema::new(["x", "predict"]).unwrap();
            let err = PipelineBuilder::from_config(&config, schema, Some(regression())).unwrap_err();
            assert!(matches!(err, PatternError::ConflictingAggregationMode { .. }));
        }
    }

    #[test]
    fn missing_expected_field_fails_build() {
        let schema = Schema::new(["x"]).unwrap();
        let err = PipelineBuilder::new(schema)
            .classifier(regression())
            .measure(MeasureMode::Confusion)
            .build()
            .unwrap_err();
        assert!(matches!(err, PatternError::MissingField { field, .. } if field == "predict"));
    }

    #[test]
    fn undeclared_predicate_field_fails_build() {
        let tree = Classifier::from_json_str(
            r#"{"family":"tree","target":"species","fields":[],"model":{"nodes":[
                {"id":"root","score":"setosa"},
                {"id":"long","parent":"root","score":"versicolor",
                 "predicate":{"kind":"simple","field":"petal_length","operator":"greaterThan","value":2.45}}]}}"#,
        )
        .unwrap();
        let err = PipelineBuilder::new(Schema::new(["other"]).unwrap())
            .classifier(tree)
            .build()
            .unwrap_err();
        assert!(
            matches!(&err, PatternError::MissingField { stage, field } if stage == "score" && field == "petal_length"),
            "{err}"
        );
    }

    #[test]
    fn rmse_groups_by_model_target_by_default() {
        let schema = Schema::new(["x", "predict", "label"]).unwrap();
        let pipeline = PipelineBuilder::new(schema)
            .classifier(regression())
            .measure(MeasureMode::Rmse)
            .build()
            .unwrap();
        assert_eq!(pipeline.measure_schema().unwrap().fields()[0], "label");

        let unscored = Schema::new(["score", "predict"]).unwrap();
        let err = PipelineBuilder::new(unscored)
            .measure(MeasureMode::Rmse)
            .build()
            .unwrap_err();
        assert!(matches!(err, PatternError::MissingGroupField));
    }

    #[test]
    fn unscored_flow_passes_records_through() {
        let schema = Schema::new(["a", "b"]).unwrap();
        let pipeline = PipelineBuilder::new(schema).build().unwrap();
        let record = Record::new(vec![Value::from("1"), Value::Null]);
        let out = pipeline.process(record.clone()).unwrap();
        assert_eq!(out.primary, Some(record));
        assert!(out.traps.is_empty());
    }

    #[test]
    fn dot_lists_the_branch() {
        let schema = Schema::new(["x", "predict"]).unwrap();
        let pipeline = PipelineBuilder::new(schema)
            .classifier(regression())
            .measure(MeasureMode::Confusion)
            .build()
            .unwrap();
        let dot = pipeline.to_dot();
        assert!(dot.contains("\"validate\" -> \"confusion\""));
        assert!(dot.contains("\"score\" -> \"trap\""));
        assert_eq!(pipeline.stage_names(), vec!["source", "score", "validate", "confusion"]);
    }

    #[test]
    fn trap_row_fits_ragged_records_to_the_source_width() {
        let schema = Schema::new(["a", "b"]).unwrap();
        let pipeline = PipelineBuilder::new(schema).build().unwrap();

        let short = TrapRecord::new(Record::new(vec![Value::from("1")]), "ingest", "line 2: row has 1 fields");
        let row = pipeline.trap_row(&short);
        assert_eq!(
            row.values(),
            &[Value::from("1"), Value::Null, Value::from("ingest: line 2: row has 1 fields")]
        );

        let wide = Record::new(vec![Value::from("1"), Value::from("2"), Value::from("3"), Value::from("4")]);
        let row = pipeline.trap_row(&TrapRecord::new(wide, "ingest", "line 3: row has 4 fields"));
        assert_eq!(row.len(), 3);
        assert_eq!(
            row.values()[2],
            Value::from("ingest: line 3: row has 4 fields (2 extra cell(s) not in the header: '3', '4')")
        );
    }
}
