//! Embeddable build pipeline for mpir, mpfr and MerkurNewton.
//!
//! Clap-free: the CLI merges its flags and config file into
//! [`RunSettings`](settings::RunSettings) and calls
//! [`run_build`](pipeline::run_build).
//!
//! # Port traits
//!
//! Every external program is reached through a trait in [`ports`]:
//! - [`ProcessRunner`](ports::ProcessRunner) runs build drivers, scripts and the application
//! - [`GitPort`](ports::GitPort) clones and updates checkouts
//! - [`ToolsetProbe`](ports::ToolsetProbe) checks whether a compiler toolset works
//! - [`VersionProbe`](ports::VersionProbe) reads the version of a build driver
//!
//! The [`adapters`] module provides the process-spawning implementations.
//!
//! # Entry points
//!
//! - [`run_build`](pipeline::run_build) syncs, patches, compiles and collects the selected packages
//! - [`clean_all`](pipeline::clean_all) removes outputs and checkouts

pub mod adapters;
pub mod compile;
pub mod error;
pub mod fsutil;
pub mod pipeline;
pub mod ports;
pub mod process;
pub mod repo;
pub mod settings;
pub mod toolchain;
pub mod tuning;
pub mod verify;

pub use error::{BuildError, BuildResult};
pub use pipeline::{BuildOutcome, run_build};
