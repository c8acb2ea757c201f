//! Default process-backed port implementations.

use crate::ports::{GitPort, ProcessRunner, ToolsetProbe, VersionProbe};
use crate::process::{ProcessOutput, ProcessSpec, StdoutSink};
use crate::toolchain::{EnvScript, toolset_probe_spec};
use anyhow::Context;
use camino::Utf8Path;
use fs_err as fs;
use mnbuild_types::version::Version;
use std::process::{Command, Stdio};
use tracing::{debug, trace};

#[cfg(windows)]
const HIGH_PRIORITY_CLASS: u32 = 0x0000_0080;

/// Spawns real processes with `std::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, spec: &ProcessSpec) -> anyhow::Result<ProcessOutput> {
        trace!("run {}", spec.command_line());

        let mut cmd = Command::new(spec.program.as_std_path());
        push_args(&mut cmd, spec);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        if let Some(env) = &spec.env {
            cmd.env_clear();
            cmd.envs(env.iter());
        }
        if spec.high_priority {
            set_high_priority(&mut cmd);
        }

        cmd.stdin(Stdio::null());
        cmd.stderr(Stdio::piped());
        match &spec.stdout {
            StdoutSink::Inherit => {
                cmd.stdout(Stdio::inherit());
            }
            StdoutSink::Capture => {
                cmd.stdout(Stdio::piped());
            }
            StdoutSink::Append(path) => {
                let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
                cmd.stdout(Stdio::from(file.into_parts().0));
            }
            StdoutSink::Truncate(path) => {
                let file = fs::File::create(path)?;
                cmd.stdout(Stdio::from(file.into_parts().0));
            }
        }

        let output = cmd
            .output()
            .with_context(|| format!("failed to start {}", spec.program))?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(windows)]
fn push_args(cmd: &mut Command, spec: &ProcessSpec) {
    use std::os::windows::process::CommandExt;
    if spec.verbatim_args {
        for arg in &spec.args {
            cmd.raw_arg(arg);
        }
    } else {
        cmd.args(&spec.args);
    }
}

#[cfg(not(windows))]
fn push_args(cmd: &mut Command, spec: &ProcessSpec) {
    cmd.args(&spec.args);
}

#[cfg(windows)]
fn set_high_priority(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    cmd.creation_flags(HIGH_PRIORITY_CLASS);
}

#[cfg(not(windows))]
fn set_high_priority(_cmd: &mut Command) {
    debug!("process priority is only raised on Windows");
}

/// Git operations through the `git` executable on `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellGitPort;

impl ShellGitPort {
    fn git(&self, cwd: Option<&Utf8Path>, args: &[&str]) -> anyhow::Result<std::process::Output> {
        let mut cmd = Command::new("git");
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd.output()
            .with_context(|| format!("failed to run git {}", args.join(" ")))
    }

    fn git_ok(&self, cwd: Option<&Utf8Path>, args: &[&str]) -> anyhow::Result<()> {
        let output = self.git(cwd, args)?;
        if !output.status.success() {
            anyhow::bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

impl GitPort for ShellGitPort {
    fn origin_url(&self, repo_dir: &Utf8Path) -> anyhow::Result<Option<String>> {
        let output = self.git(Some(repo_dir), &["config", "--get", "remote.origin.url"])?;
        if !output.status.success() {
            return Ok(None);
        }
        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!url.is_empty()).then_some(url))
    }

    fn clone_repo(&self, url: &str, branch: &str, dest: &Utf8Path) -> anyhow::Result<()> {
        self.git_ok(None, &["clone", "--branch", branch, url, dest.as_str()])
    }

    fn checkout(&self, repo_dir: &Utf8Path, branch: &str) -> anyhow::Result<()> {
        self.git_ok(Some(repo_dir), &["checkout", branch])
    }

    fn pull(&self, repo_dir: &Utf8Path) -> anyhow::Result<()> {
        self.git_ok(Some(repo_dir), &["pull"])
    }
}

/// Probes a toolset in a throwaway `cmd.exe`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellToolsetProbe {
    runner: SystemRunner,
}

impl ToolsetProbe for ShellToolsetProbe {
    fn is_usable(&self, script: &EnvScript, toolset: &str) -> anyhow::Result<bool> {
        let output = self.runner.run(&toolset_probe_spec(script, toolset))?;
        for line in output.stderr.lines() {
            trace!("{}", line);
        }
        Ok(output.success())
    }
}

/// Asks the build driver itself: `msbuild -version -nologo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsbuildVersionProbe;

impl VersionProbe for MsbuildVersionProbe {
    fn file_version(&self, exe: &Utf8Path) -> Option<Version> {
        let output = Command::new(exe.as_std_path())
            .args(["-version", "-nologo"])
            .output()
            .ok()?;
        if !output.status.success() {
            debug!("{} -version failed", exe);
            return None;
        }
        parse_driver_version(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Last non-empty line, with any `+commit` suffix dropped.
///
/// `msbuild -version` prints e.g. `16.11.2+f32259642` or `17.8.3.51904`.
pub fn parse_driver_version(stdout: &str) -> Option<Version> {
    let line = stdout.lines().map(str::trim).rfind(|l| !l.is_empty())?;
    let version = line.split('+').next()?;
    version.parse().ok()
}
