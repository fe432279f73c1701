// Library interface for acme-harness
// Exposes the harness stages for the binary and for integration tests

pub mod cli;
pub mod clock;
pub mod config;
pub mod dependency;
pub mod docker;
pub mod errors;
pub mod exec;
pub mod harness;
pub mod jobs;
pub mod logging;
pub mod ports;
pub mod probe;
pub mod redirect;
