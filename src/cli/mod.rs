//! Command-line parsing for the `pattern` classification flow.
//!
//! Parsing is kept apart from flow assembly: this module only turns argv (and
//! a few environment fallbacks) into [`Cli`]; `app` maps it onto a
//! [`crate::domain::FlowConfig`].

use std::path::PathBuf;

use clap::Parser;

use crate::domain::{DEFAULT_BATCH_SIZE, DEFAULT_EXPECTED_FIELD, DEFAULT_MATCH_FIELD, DEFAULT_SCORE_FIELD};

/// Top-level CLI.
#[derive(Debug, Parser, Clone)]
#[command(
    name = "pattern",
    version,
    about = "Score delimited records with a predictive model and measure the predictions"
)]
pub struct Cli {
    /// Delimited input table (header line required).
    pub input: PathBuf,

    /// Scored records are written here.
    pub output: PathBuf,

    /// Records that fail any stage are written here with a `trap_reason` column.
    pub trap: PathBuf,

    /// Model definition (JSON). Without one, records pass through unscored.
    #[arg(long, env = "PATTERN_MODEL")]
    pub pmml: Option<PathBuf>,

    /// Validate predictions against the expected field and write the
    /// confusion matrix here.
    #[arg(long, alias = "validation-source")]
    pub measure: Option<PathBuf>,

    /// Compute per-group RMSE of numeric predictions and write it here.
    #[arg(long, alias = "error-source")]
    pub rmse: Option<PathBuf>,

    /// Log a snapshot of every record after each stage.
    #[arg(long)]
    pub debug: bool,

    /// Fail the run (exit code 4) if any validated prediction mismatches.
    #[arg(long)]
    pub assert: bool,

    /// Name of the appended prediction field.
    #[arg(long, default_value = DEFAULT_SCORE_FIELD)]
    pub score_field: String,

    /// Field holding the expected value.
    #[arg(long, default_value = DEFAULT_EXPECTED_FIELD)]
    pub expected_field: String,

    /// Name of the appended validation flag.
    #[arg(long, default_value = DEFAULT_MATCH_FIELD)]
    pub match_field: String,

    /// RMSE grouping field (defaults to the model's target field).
    #[arg(long)]
    pub group_field: Option<String>,

    /// Field delimiter for input and output tables.
    #[arg(long, default_value_t = '\t', value_parser = parse_delimiter)]
    pub delimiter: char,

    /// Records per parallel batch.
    #[arg(long, env = "PATTERN_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Write the flow graph in Graphviz format.
    #[arg(long)]
    pub dot: Option<PathBuf>,

    /// Write the run report as JSON.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

fn parse_delimiter(raw: &str) -> Result<char, String> {
    let c = match raw {
        "\\t" | "tab" => '\t',
        _ => {
            let mut chars = raw.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => return Err(format!("delimiter must be a single character, got '{raw}'")),
            }
        }
    };
    if !c.is_ascii() {
        return Err(format!("delimiter must be ASCII, got '{c}'"));
    }
    Ok(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_locations_and_defaults() {
        let cli = Cli::try_parse_from(["pattern", "in.tsv", "out.tsv", "trap.tsv"]).unwrap();
        assert_eq!(cli.input, PathBuf::from("in.tsv"));
        assert_eq!(cli.delimiter, '\t');
        assert_eq!(cli.score_field, "score");
        assert!(cli.pmml.is_none() && !cli.assert);
    }

    #[test]
    fn both_measure_options_parse() {
        // The conflict is reported when the flow is assembled.
        let cli = Cli::try_parse_from([
            "pattern", "in", "out", "trap", "--measure", "m", "--error-source", "r",
        ])
        .unwrap();
        assert!(cli.measure.is_some() && cli.rmse.is_some());
    }

    #[test]
    fn aliases_and_delimiter_parsing() {
        let cli = Cli::try_parse_from([
            "pattern",
            "in",
            "out",
            "trap",
            "--validation-source",
            "m",
            "--delimiter",
            ",",
        ])
        .unwrap();
        assert_eq!(cli.measure, Some(PathBuf::from("m")));
        assert_eq!(cli.delimiter, ',');

        assert_eq!(parse_delimiter("tab"), Ok('\t'));
        assert!(parse_delimiter("ab").is_err());
    }
}
