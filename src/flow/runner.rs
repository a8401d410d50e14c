//! Flow execution.
//!
//! The runner pulls records from a source in fixed-size batches. Each batch is
//! processed on the rayon pool; partial aggregates are folded per worker and
//! merged into the run total. Sink writes stay on the calling thread, in input
//! order.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{DEFAULT_BATCH_SIZE, Enforcement, Routed};
use crate::error::PatternError;
use crate::flow::aggregate::{Aggregate, ConfusionRow, RmseRow};
use crate::flow::builder::{Pipeline, Processed};
use crate::io::RecordSink;

/// Where a run writes its output.
pub struct Sinks<'a> {
    pub primary: &'a mut dyn RecordSink,
    pub trap: &'a mut dyn RecordSink,
    /// Required when the flow has a measure branch.
    pub measure: Option<&'a mut dyn RecordSink>,
}

/// Final state of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    /// At least one record was trapped.
    CompletedWithTraps,
    /// Strict validation saw at least one mismatch.
    AssertionFailed,
}

impl RunStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            RunStatus::Succeeded => 0,
            RunStatus::CompletedWithTraps => 3,
            RunStatus::AssertionFailed => 4,
        }
    }
}

/// Counters and tables produced by one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub read: u64,
    pub written: u64,
    pub trapped: u64,
    /// Records that reached the measure aggregation.
    pub measured: u64,
    pub mismatches: u64,
    pub violations: u64,
    pub enforcement: Option<Enforcement>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub confusion: Vec<ConfusionRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rmse: Vec<RmseRow>,
    pub status: RunStatus,
}

#[derive(Debug, Default)]
struct Counters {
    read: u64,
    written: u64,
    trapped: u64,
    mismatches: u64,
    violations: u64,
}

/// Executes a [`Pipeline`] against a record source.
#[derive(Debug)]
pub struct Runner {
    pipeline: Pipeline,
    batch_size: usize,
}

impl Runner {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Run the flow to completion.
    ///
    /// Trapped records never fail the run. Source errors, sink errors and
    /// lifecycle errors abort it.
    pub fn run<S>(mut self, source: S, mut sinks: Sinks<'_>) -> Result<RunReport, PatternError>
    where
        S: IntoIterator<Item = Result<Routed, PatternError>>,
    {
        if let Some(branch) = self.pipeline.branch().name()
            && sinks.measure.is_none()
        {
            return Err(PatternError::MissingSink { branch });
        }

        self.pipeline.prepare();
        let pipeline = &self.pipeline;

        let mut total = pipeline.empty_aggregate();
        let mut counters = Counters::default();
        let mut batches = 0usize;

        let mut source = source.into_iter();
        loop {
            let batch: Vec<Routed> = source
                .by_ref()
                .take(self.batch_size)
                .collect::<Result<_, PatternError>>()?;
            if batch.is_empty() {
                break;
            }
            batches += 1;
            counters.read += batch.len() as u64;

            let outcomes: Vec<Processed> = batch
                .into_par_iter()
                .map(|routed| match routed {
                    Routed::Pass(record) => pipeline.process(record),
                    Routed::Trapped(trap) => Ok(Processed::trapped(trap)),
                })
                .collect::<Result<_, PatternError>>()?;

            if let Some(acc) = total.take() {
                let partial = outcomes
                    .par_iter()
                    .filter_map(|p| p.contribution.as_ref())
                    .fold(
                        || acc.empty_like(),
                        |mut part, contribution| {
                            part.observe(contribution);
                            part
                        },
                    )
                    .reduce(|| acc.empty_like(), Aggregate::merge);
                total = Some(acc.merge(partial));
            }

            for outcome in &outcomes {
                for trap in &outcome.traps {
                    debug!(stage = trap.stage, reason = %trap.reason, "trapped record");
                    sinks.trap.write(&pipeline.trap_row(trap))?;
                    counters.trapped += 1;
                }
                if let Some(record) = &outcome.primary {
                    sinks.primary.write(record)?;
                    counters.written += 1;
                }
                counters.mismatches += outcome.mismatch as u64;
                counters.violations += outcome.violation as u64;
            }
            debug!(batch = batches, records = outcomes.len(), "batch complete");
        }

        if let (Some(acc), Some(measure)) = (&total, sinks.measure.as_mut()) {
            for row in acc.to_records() {
                measure.write(&row)?;
            }
            measure.finish()?;
        }
        sinks.primary.finish()?;
        sinks.trap.finish()?;

        let status = if counters.violations > 0 {
            RunStatus::AssertionFailed
        } else if counters.trapped > 0 {
            RunStatus::CompletedWithTraps
        } else {
            RunStatus::Succeeded
        };

        let (confusion, accuracy, rmse) = match &total {
            Some(Aggregate::Confusion(m)) => (m.rows(), m.accuracy(), Vec::new()),
            Some(Aggregate::Rmse(r)) => (Vec::new(), None, r.rows()),
            None => (Vec::new(), None, Vec::new()),
        };

        let report = RunReport {
            read: counters.read,
            written: counters.written,
            trapped: counters.trapped,
            measured: total.as_ref().map(Aggregate::total).unwrap_or(0),
            mismatches: counters.mismatches,
            violations: counters.violations,
            enforcement: pipeline.enforcement(),
            confusion,
            accuracy,
            rmse,
            status,
        };

        if report.trapped > 0 {
            warn!(trapped = report.trapped, "records were diverted to the trap sink");
        }
        if status == RunStatus::AssertionFailed {
            warn!(violations = report.violations, "strict validation failed");
        }
        info!(
            read = report.read,
            written = report.written,
            trapped = report.trapped,
            batches,
            status = ?status,
            "flow complete"
        );
        Ok(report)
    }
}
