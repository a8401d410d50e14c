//! The classification flow: stages, assembly, aggregation and execution.

pub mod aggregate;
pub mod builder;
pub mod runner;
pub mod stages;

pub use aggregate::{Aggregate, ConfusionMatrix, ConfusionRow, Contribution, RmseAggregate, RmseRow};
pub use builder::{Branch, MeasureMode, Pipeline, PipelineBuilder, Processed};
pub use runner::{RunReport, RunStatus, Runner, Sinks};
