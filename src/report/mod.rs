//! Terminal output for finished runs.
//!
//! Formatting lives here so the flow code never prints; the binary decides
//! what to show.

pub mod format;

pub use format::*;
