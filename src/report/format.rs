//! Plain-text run summaries and measure tables.

use crate::domain::{Enforcement, FlowConfig, ModelFamily};
use crate::flow::{ConfusionRow, RmseRow, RunReport};

/// Format the run summary: locations, model, counters and status.
pub fn format_run_summary(report: &RunReport, config: &FlowConfig, family: Option<ModelFamily>) -> String {
    let mut out = String::new();

    out.push_str("=== pattern - classification flow ===\n");
    out.push_str(&format!("Input : {}\n", config.input.display()));
    out.push_str(&format!("Output: {}\n", config.output.display()));
    out.push_str(&format!("Trap  : {}\n", config.trap.display()));
    match (family, &config.model) {
        (Some(family), Some(path)) => {
            out.push_str(&format!("Model : {} ({})\n", family.display_name(), path.display()));
        }
        _ => out.push_str("Model : none (records pass through unscored)\n"),
    }
    if let Some(enforcement) = report.enforcement {
        let level = match enforcement {
            Enforcement::Lenient => "lenient",
            Enforcement::Strict => "strict (--assert)",
        };
        out.push_str(&format!("Validation: {level}\n"));
    }

    out.push_str(&format!(
        "Records: read={} written={} trapped={}\n",
        report.read, report.written, report.trapped
    ));
    if report.enforcement.is_some() {
        out.push_str(&format!(
            "Checked: measured={} mismatches={} violations={}\n",
            report.measured, report.mismatches, report.violations
        ));
    }
    out.push_str(&format!("Status: {:?}\n", report.status));

    if !report.confusion.is_empty() {
        out.push('\n');
        out.push_str(&format_confusion(&report.confusion, report.accuracy));
    }
    if !report.rmse.is_empty() {
        out.push('\n');
        out.push_str(&format_rmse(&report.rmse));
    }

    out
}

/// Format confusion-matrix cells, one line per (expected, predicted) pair.
pub fn format_confusion(rows: &[ConfusionRow], accuracy: Option<f64>) -> String {
    let mut out = String::new();
    out.push_str("Confusion (expected -> predicted):\n");
    push_line(&mut out, format!("{:<20} {:<20} {:>10}", "expected", "predicted", "count"));
    push_line(&mut out, format!("{:-<20} {:-<20} {:-<10}", "", "", ""));
    for r in rows {
        push_line(
            &mut out,
            format!("{:<20} {:<20} {:>10}", truncate(&r.expected, 20), truncate(&r.predicted, 20), r.count),
        );
    }
    if let Some(acc) = accuracy {
        out.push_str(&format!("Accuracy: {:.2}%\n", acc * 100.0));
    }
    out
}

/// Format per-group RMSE.
pub fn format_rmse(rows: &[RmseRow]) -> String {
    let mut out = String::new();
    out.push_str("RMSE by group:\n");
    push_line(&mut out, format!("{:<24} {:>14} {:>10}", "group", "rmse", "count"));
    push_line(&mut out, format!("{:-<24} {:-<14} {:-<10}", "", "", ""));
    for r in rows {
        push_line(&mut out, format!("{:<24} {:>14.6} {:>10}", truncate(&r.group, 24), r.rmse, r.count));
    }
    out
}

fn push_line(out: &mut String, line: String) {
    out.push_str(line.trim_end());
    out.push('\n');
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
