//! Port traits abstracting external programs away from the pipelines.

use crate::fsutil::remove_path_forced;
use crate::process::{ProcessOutput, ProcessSpec};
use crate::toolchain::EnvScript;
use camino::Utf8Path;
use mnbuild_types::version::Version;

/// Runs one external process to completion.
///
/// `Err` means the process could not be started; a non-zero exit is an
/// `Ok` with the code in [`ProcessOutput::code`].
pub trait ProcessRunner {
    fn run(&self, spec: &ProcessSpec) -> anyhow::Result<ProcessOutput>;
}

/// Git operations needed to keep a working copy in sync.
pub trait GitPort {
    /// `remote.origin.url` of the working copy, `None` if it cannot be read.
    fn origin_url(&self, repo_dir: &Utf8Path) -> anyhow::Result<Option<String>>;
    fn clone_repo(&self, url: &str, branch: &str, dest: &Utf8Path) -> anyhow::Result<()>;
    fn checkout(&self, repo_dir: &Utf8Path, branch: &str) -> anyhow::Result<()>;
    fn pull(&self, repo_dir: &Utf8Path) -> anyhow::Result<()>;

    /// Delete a working copy that can no longer be updated.
    fn remove_working_copy(&self, repo_dir: &Utf8Path) -> anyhow::Result<()> {
        remove_path_forced(repo_dir)
    }
}

/// Capability check for one toolset version.
pub trait ToolsetProbe {
    /// Whether the environment script accepts `toolset` and the compiler starts afterwards.
    fn is_usable(&self, script: &EnvScript, toolset: &str) -> anyhow::Result<bool>;
}

/// File version of a build-driver executable.
pub trait VersionProbe {
    fn file_version(&self, exe: &Utf8Path) -> Option<Version>;
}

/// Every port a run needs, borrowed for its duration.
#[derive(Clone, Copy)]
pub struct Ports<'a> {
    pub runner: &'a dyn ProcessRunner,
    pub git: &'a dyn GitPort,
    pub toolset: &'a dyn ToolsetProbe,
    pub version: &'a dyn VersionProbe,
}
