//! Diagnostics helpers.

#[cfg(feature = "bench")]
pub mod bench;
