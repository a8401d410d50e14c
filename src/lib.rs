//! `pattern-flow` library crate.
//!
//! The binary (`pattern`) is a thin wrapper around this library so that:
//!
//! - flows can be assembled and run in tests without spawning processes
//! - models, stages and sinks are reusable outside the CLI

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod flow;
pub mod io;
pub mod models;
pub mod report;
