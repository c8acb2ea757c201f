use crate::package::PackageVariant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Summary written to `logs/report.json` after every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub schema: String,
    pub tool: ToolInfo,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<ToolchainInfo>,
    #[serde(default)]
    pub packages: Vec<PackageReport>,
    /// Non-fatal errors reported during the run.
    pub error_count: u64,
}

impl RunReport {
    pub fn new(tool: ToolInfo) -> Self {
        Self {
            schema: crate::schema::MNBUILD_REPORT_V1.to_string(),
            tool,
            started_at: Utc::now(),
            ended_at: None,
            toolchain: None,
            packages: Vec::new(),
            error_count: 0,
        }
    }

    pub fn verification_failed(&self) -> bool {
        self.packages
            .iter()
            .flat_map(|p| &p.verifications)
            .any(|v| !v.passed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: Option<String>,
}

/// What the environment builder settled on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainInfo {
    pub install_path: String,
    pub env_script: String,
    pub toolset: String,
    pub msbuild: String,
    pub sdk_version: String,
}

/// What had to happen to a package's working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Cloned,
    Updated,
    /// An inconsistent directory was deleted and cloned again.
    Recloned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageReport {
    pub variant: PackageVariant,
    pub repo_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncAction>,
    pub patches_applied: u64,
    pub targets_built: Vec<String>,
    pub artifacts_copied: u64,
    /// SHA-256 of every collected file, keyed by its path below `build`.
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning_attempts: Option<u32>,
    #[serde(default)]
    pub verifications: Vec<Verification>,
}

impl PackageReport {
    pub fn new(variant: PackageVariant, repo_url: impl Into<String>) -> Self {
        Self {
            variant,
            repo_url: repo_url.into(),
            sync: None,
            patches_applied: 0,
            targets_built: Vec::new(),
            artifacts_copied: 0,
            artifacts: BTreeMap::new(),
            tuning_attempts: None,
            verifications: Vec::new(),
        }
    }
}

/// Outcome of comparing captured output with a known-good checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub args: Vec<String>,
    pub expected_md5: String,
    pub actual_md5: String,
    pub passed: bool,
}
