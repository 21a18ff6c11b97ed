//! Bridges between mixer output and `rodio` sources.

pub mod samples;
