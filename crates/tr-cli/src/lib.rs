//! Test failure triage CLI library.
//!
//! This crate wires the correlator in `tr-core` to git, the filesystem and
//! GitHub.

pub mod author;
mod cli;
mod config;
pub mod run;
pub mod sink;
pub mod store;

pub use cli::Cli;
pub use config::Config;
