//! Configuration file loading for mnbuild.
//!
//! Discovers and loads `mnbuild.toml` from the root directory and merges
//! it with the command line into [`RunSettings`].

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use mnbuild_core::settings::{OutputCheck, RunSettings, Selection};
use mnbuild_types::package::MpirFork;
use serde::Deserialize;
use tracing::debug;

/// The config file name to search for.
pub const CONFIG_FILE_NAME: &str = "mnbuild.toml";

/// Top-level configuration from mnbuild.toml.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MnbuildConfig {
    pub toolchain: ToolchainConfig,
    pub tuning: TuningConfig,
    /// Replaces the primary self-test.
    pub verify: VerifyConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Used instead of the `ProgramFiles(x86)` environment variable.
    pub program_files: Option<Utf8PathBuf>,

    /// Value of `CL` for every compile.
    pub compiler_flags: Option<String>,

    /// Passed to the build driver as `/p:ToolsVersion`.
    pub tools_version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Runs of the tuning program before giving up.
    pub attempts: Option<u32>,

    /// Interpreter for the tuning preparation script.
    pub python: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    pub args: Option<Vec<String>>,
    pub md5: Option<String>,
}

pub fn discover_config(root: &Utf8Path) -> Option<Utf8PathBuf> {
    let config_path = root.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        debug!("found config file at {}", config_path);
        Some(config_path)
    } else {
        debug!("no config file found at {}", config_path);
        None
    }
}

pub fn load_config(path: &Utf8Path) -> anyhow::Result<MnbuildConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config file {}", path))?;
    parse_config(&contents).with_context(|| format!("parse config file {}", path))
}

pub fn parse_config(contents: &str) -> anyhow::Result<MnbuildConfig> {
    let config: MnbuildConfig = toml::from_str(contents).context("invalid TOML")?;
    Ok(config)
}

/// Load config from the root directory, or return the default if there is none.
pub fn load_or_default(root: &Utf8Path) -> anyhow::Result<MnbuildConfig> {
    match discover_config(root) {
        Some(path) => load_config(&path),
        None => Ok(MnbuildConfig::default()),
    }
}

/// Run options taken from the command line.
#[derive(Debug, Clone)]
pub struct CliRun {
    pub root: Utf8PathBuf,
    pub selection: Selection,
    pub mpir_fork: MpirFork,
    pub tune: bool,
    pub extended_tests: bool,
    pub clean: bool,
}

/// Merges a loaded config file with the command line.
pub struct ConfigMerger {
    config: MnbuildConfig,
}

impl ConfigMerger {
    pub fn new(config: MnbuildConfig) -> Self {
        Self { config }
    }

    /// Built-in defaults, overridden by the config file, overridden by the
    /// command line.
    pub fn merge(self, cli: CliRun) -> anyhow::Result<RunSettings> {
        let mut settings = RunSettings {
            root: cli.root,
            selection: cli.selection,
            mpir_fork: cli.mpir_fork,
            tune: cli.tune,
            extended_tests: cli.extended_tests,
            clean: cli.clean,
            ..RunSettings::default()
        };

        let toolchain = self.config.toolchain;
        if toolchain.program_files.is_some() {
            settings.toolchain.program_files = toolchain.program_files;
        }
        if let Some(flags) = toolchain.compiler_flags {
            settings.toolchain.compiler_flags = flags;
        }
        if let Some(version) = toolchain.tools_version {
            settings.toolchain.tools_version = version;
        }

        if let Some(attempts) = self.config.tuning.attempts {
            anyhow::ensure!(attempts > 0, "[tuning] attempts must be at least 1");
            settings.tuning.attempts = attempts;
        }
        if let Some(python) = self.config.tuning.python {
            settings.tuning.python = python;
        }

        let verify = self.config.verify;
        if verify.args.is_some() || verify.md5.is_some() {
            let args = verify.args.unwrap_or_else(|| settings.verify.primary.args.clone());
            let md5 = verify.md5.unwrap_or_else(|| settings.verify.primary.md5.clone());
            anyhow::ensure!(is_md5_hex(&md5), "[verify] md5 {:?} is not an MD5 hex digest", md5);
            settings.verify.primary = OutputCheck { args, md5 };
        }

        Ok(settings)
    }
}

fn is_md5_hex(s: &str) -> bool {
    s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit())
}
