//! One end-to-end run: load, assemble, execute, write artifacts.
//!
//! Kept apart from `app` so tests can drive a full run from a `FlowConfig`
//! without touching argv or the global subscriber.

use tracing::info;

use crate::domain::{FlowConfig, ModelFamily};
use crate::error::PatternError;
use crate::flow::{MeasureMode, PipelineBuilder, RunReport, Runner, Sinks};
use crate::io::{CsvSink, RecordSink, TableSource};
use crate::models::Classifier;

/// Everything a finished run hands back to the caller.
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub report: RunReport,
    pub family: Option<ModelFamily>,
}

/// Execute the flow described by `config`.
///
/// Configuration conflicts are reported before any file is opened.
pub fn run_job(config: &FlowConfig) -> Result<JobOutput, PatternError> {
    let mode = MeasureMode::from_config(config)?;

    let classifier = config.model.as_deref().map(Classifier::load).transpose()?;
    let family = classifier.as_ref().map(Classifier::family);

    let source = TableSource::open(&config.input, config.delimiter)?;
    info!(input = source.label(), fields = source.schema().len(), "opened source");

    let pipeline = PipelineBuilder::from_config(config, source.schema().clone(), classifier)?.build()?;

    if let Some(path) = &config.dot {
        crate::io::write_dot(path, &pipeline.to_dot())?;
    }

    let mut primary = CsvSink::create(&config.output, pipeline.primary_schema(), config.delimiter)?;
    let mut trap = CsvSink::create(&config.trap, pipeline.trap_schema(), config.delimiter)?;
    let measure_path = match mode {
        MeasureMode::Confusion => config.validation_source.as_deref(),
        MeasureMode::Rmse => config.error_source.as_deref(),
        MeasureMode::None => None,
    };
    let mut measure = match (measure_path, pipeline.measure_schema()) {
        (Some(path), Some(schema)) => Some(CsvSink::create(path, schema, config.delimiter)?),
        _ => None,
    };

    let sinks = Sinks {
        primary: &mut primary,
        trap: &mut trap,
        measure: measure.as_mut().map(|m| m as &mut dyn RecordSink),
    };
    let report = Runner::new(pipeline)
        .with_batch_size(config.batch_size)
        .run(source, sinks)?;

    if let Some(path) = &config.report {
        crate::io::write_report_json(path, &report, config)?;
    }

    Ok(JobOutput { report, family })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::flow::RunStatus;

    const IRIS_TREE: &str = r#"{
        "family": "TreeModel",
        "target": "species",
        "fields": ["petal_length"],
        "model": { "nodes": [
            { "id": "root", "score": "setosa" },
            { "id": "short", "parent": "root", "score": "setosa",
              "predicate": { "kind": "simple", "field": "petal_length", "operator": "lessThan", "value": 2.45 } },
            { "id": "long", "parent": "root", "score": "versicolor",
              "predicate": { "kind": "simple", "field": "petal_length", "operator": "greaterOrEqual", "value": 2.45 } }
        ] }
    }"#;

    const LINEAR: &str = r#"{
        "family": "regression",
        "target": "segment",
        "fields": ["x"],
        "model": { "tables": [ { "intercept": 0.0, "numeric": [ { "name": "x", "coefficient": 1.0 } ] } ] }
    }"#;

    fn setup(dir: &Path, model: &str, input: &str) -> FlowConfig {
        fs::write(dir.join("model.json"), model).unwrap();
        fs::write(dir.join("input.tsv"), input).unwrap();
        let mut config = FlowConfig::new(
            dir.join("input.tsv"),
            dir.join("out").join("classify.tsv"),
            dir.join("out").join("trap.tsv"),
        );
        config.model = Some(dir.join("model.json"));
        config
    }

    #[test]
    fn confusion_run_writes_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = setup(
            dir.path(),
            IRIS_TREE,
            "petal_length\tpredict\n1.4\tsetosa\n4.7\tversicolor\n1.3\tversicolor\n",
        );
        config.validation_source = Some(dir.path().join("out").join("measure.tsv"));
        config.dot = Some(dir.path().join("dot").join("classify.dot"));
        config.report = Some(dir.path().join("report.json"));

        let out = run_job(&config).unwrap();
        assert_eq!(out.family, Some(ModelFamily::Tree));
        assert_eq!(out.report.status, RunStatus::Succeeded);
        assert_eq!(out.report.mismatches, 1);

        let classified = fs::read_to_string(&config.output).unwrap();
        assert_eq!(
            classified,
            "petal_length\tpredict\tscore\n1.4\tsetosa\tsetosa\n4.7\tversicolor\tversicolor\n1.3\tversicolor\tsetosa\n"
        );
        let measure = fs::read_to_string(dir.path().join("out").join("measure.tsv")).unwrap();
        assert_eq!(
            measure,
            "predict\tscore\tcount\nsetosa\tsetosa\t1\nversicolor\tsetosa\t1\nversicolor\tversicolor\t1\n"
        );
        let trap = fs::read_to_string(&config.trap).unwrap();
        assert_eq!(trap, "petal_length\tpredict\ttrap_reason\n");

        assert!(fs::read_to_string(dir.path().join("dot").join("classify.dot")).unwrap().starts_with("digraph"));
        let report: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("report.json")).unwrap()).unwrap();
        assert_eq!(report["status"], "succeeded");
        assert_eq!(report["read"], 3);
    }

    #[test]
    fn strict_mismatch_fails_after_completing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = setup(
            dir.path(),
            IRIS_TREE,
            "petal_length\tpredict\n1.4\tsetosa\n1.3\tversicolor\n",
        );
        config.validation_source = Some(dir.path().join("measure.tsv"));
        config.assert = true;

        let out = run_job(&config).unwrap();
        assert_eq!(out.report.status, RunStatus::AssertionFailed);
        assert_eq!(out.report.violations, 1);
        // Every record still reaches the output.
        assert_eq!(fs::read_to_string(&config.output).unwrap().lines().count(), 3);
    }

    #[test]
    fn rmse_run_traps_unscorable_and_non_numeric_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = setup(
            dir.path(),
            LINEAR,
            "x\tpredict\tsegment\n1\t1\ta\n2\t2\ta\n3\t5\ta\nbad\t1\ta\n4\tn/a\tb\n",
        );
        config.error_source = Some(dir.path().join("rmse.tsv"));
        config.batch_size = 2;

        let out = run_job(&config).unwrap();
        assert_eq!(out.report.status, RunStatus::CompletedWithTraps);
        assert_eq!(out.report.trapped, 2);
        assert_eq!(out.report.rmse.len(), 1);
        assert!((out.report.rmse[0].rmse - 1.1547005383792515).abs() < 1e-9);

        let trap = fs::read_to_string(&config.trap).unwrap();
        let lines: Vec<&str> = trap.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("bad\t1\ta\tscore: "), "{}", lines[1]);
        assert!(lines[2].starts_with("4\tn/a\tb\trmse: "), "{}", lines[2]);
    }

    #[test]
    fn conflicting_measure_modes_fail_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = FlowConfig::new(
            dir.path().join("missing.tsv"),
            dir.path().join("out.tsv"),
            dir.path().join("trap.tsv"),
        );
        config.validation_source = Some(dir.path().join("m.tsv"));
        config.error_source = Some(dir.path().join("r.tsv"));

        let err = run_job(&config).unwrap_err();
        assert!(matches!(err, PatternError::ConflictingAggregationMode { .. }));
        assert!(!dir.path().join("out.tsv").exists());
    }

    #[test]
    fn unsupported_model_family_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = setup(
            dir.path(),
            r#"{"family":"NeuralNetwork","target":"y","fields":[]}"#,
            "x\n1\n",
        );
        let err = run_job(&config).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(matches!(&err, PatternError::UnsupportedModelFamily { family } if family == "NeuralNetwork"));
    }
}
