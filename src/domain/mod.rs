//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - cell values, schemas and records (`Value`, `Schema`, `Record`)
//! - trap routing (`TrapRecord`, `Routed`)
//! - the model family tag set (`ModelFamily`)
//! - run configuration (`FlowConfig`, `Enforcement`)

pub mod types;

pub use types::*;
