//! Shared data types for the mnbuild workspace.
//!
//! # Design constraints
//! - Values here are plain data: no process spawning, no filesystem writes.
//! - Descriptors and environment snapshots are immutable once built.
//! - `report` types are serialized to `logs/report.json`; prefer adding
//!   optional fields over changing semantics.

pub mod env;
pub mod layout;
pub mod package;
pub mod patch;
pub mod report;
pub mod version;

/// Schema identifiers.
pub mod schema {
    pub const MNBUILD_REPORT_V1: &str = "mnbuild.report.v1";
}
