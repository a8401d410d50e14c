//! Input/output helpers.
//!
//! - delimited-text sources (`ingest`)
//! - record sinks, flow graph and run report files (`export`)
//! - model definition files (`model_file`)

pub mod export;
pub mod ingest;
pub mod model_file;

pub use export::*;
pub use ingest::*;
pub use model_file::*;
