//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - installs the tracing subscriber
//! - runs the flow (`job`)
//! - prints the summary and maps the run status to an exit code

use clap::Parser;

use crate::cli::Cli;
use crate::domain::FlowConfig;
use crate::error::AppError;
use crate::flow::RunStatus;

pub mod job;

/// Entry point for the `pattern` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = config_from_args(&cli);
    let out = job::run_job(&config)?;

    println!(
        "{}",
        crate::report::format_run_summary(&out.report, &config, out.family)
    );

    match out.report.status {
        RunStatus::Succeeded => Ok(()),
        RunStatus::CompletedWithTraps => Err(AppError::new(
            RunStatus::CompletedWithTraps.exit_code(),
            format!(
                "{} record(s) trapped; see {}",
                out.report.trapped,
                config.trap.display()
            ),
        )),
        RunStatus::AssertionFailed => Err(AppError::new(
            RunStatus::AssertionFailed.exit_code(),
            format!(
                "assertion failed: {} prediction(s) did not match `{}`",
                out.report.violations, config.expected_field
            ),
        )),
    }
}

/// Logs go to stderr so stdout carries only the summary.
fn init_tracing(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

pub fn config_from_args(cli: &Cli) -> FlowConfig {
    let mut config = FlowConfig::new(&cli.input, &cli.output, &cli.trap);
    config.model = cli.pmml.clone();
    config.validation_source = cli.measure.clone();
    config.error_source = cli.rmse.clone();
    config.debug = cli.debug;
    config.assert = cli.assert;
    config.score_field = cli.score_field.clone();
    config.expected_field = cli.expected_field.clone();
    config.match_field = cli.match_field.clone();
    config.group_field = cli.group_field.clone();
    // The parser only accepts ASCII delimiters.
    config.delimiter = cli.delimiter as u8;
    config.batch_size = cli.batch_size;
    config.dot = cli.dot.clone();
    config.report = cli.report.clone();
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::PipelineBuilder;
    use crate::domain::{Enforcement, Schema};
    use crate::error::PatternError;

    #[test]
    fn args_map_onto_flow_config() {
        let cli = Cli::try_parse_from([
            "pattern",
            "data/iris.tsv",
            "out/classify",
            "out/trap",
            "--pmml",
            "data/iris.json",
            "--measure",
            "out/measure",
            "--assert",
            "--delimiter",
            ",",
        ])
        .unwrap();
        let config = config_from_args(&cli);
        assert_eq!(config.delimiter, b',');
        assert_eq!(config.enforcement(), Enforcement::Strict);
        assert!(config.model.is_some() && config.error_source.is_none());
    }

    #[test]
    fn both_measure_flags_conflict_at_assembly() {
        let cli = Cli::try_parse_from([
            "pattern", "in", "out", "trap", "--measure", "m", "--rmse", "r", "--debug",
        ])
        .unwrap();
        let config = config_from_args(&cli);
        let schema = Schema::new(["predict", "score"]).unwrap();
        let err = PipelineBuilder::from_config(&config, schema, None).unwrap_err();
        assert!(matches!(err, PatternError::ConflictingAggregationMode { .. }));
        assert_eq!(AppError::from(err).exit_code(), 2);
    }
}
