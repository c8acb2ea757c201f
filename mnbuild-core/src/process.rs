//! Description of one external process run.

use camino::{Utf8Path, Utf8PathBuf};
use mnbuild_types::env::CompileEnv;

/// Where the child's standard output goes. Standard error is always captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdoutSink {
    /// The parent's console.
    Inherit,
    Capture,
    /// Append to a log file, creating it if needed.
    Append(Utf8PathBuf),
    /// Replace the file's contents.
    Truncate(Utf8PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: Utf8PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<Utf8PathBuf>,
    /// Replaces the whole child environment when set.
    pub env: Option<CompileEnv>,
    pub stdout: StdoutSink,
    pub high_priority: bool,
    /// Pass arguments to the child without quoting (for `cmd.exe /C` lines).
    pub verbatim_args: bool,
}

impl ProcessSpec {
    pub fn new(program: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: None,
            stdout: StdoutSink::Capture,
            high_priority: false,
            verbatim_args: false,
        }
    }

    /// `cmd.exe /C <line>` with the line passed through untouched.
    pub fn shell(line: impl Into<String>) -> Self {
        let mut spec = Self::new("cmd.exe");
        spec.args = vec!["/C".to_string(), line.into()];
        spec.verbatim_args = true;
        spec
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl AsRef<Utf8Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, env: &CompileEnv) -> Self {
        self.env = Some(env.clone());
        self
    }

    pub fn stdout(mut self, sink: StdoutSink) -> Self {
        self.stdout = sink;
        self
    }

    pub fn high_priority(mut self) -> Self {
        self.high_priority = true;
        self
    }

    /// Program name without directories, for log lines and error messages.
    pub fn display_name(&self) -> &str {
        self.program.file_name().unwrap_or(self.program.as_str())
    }

    pub fn command_line(&self) -> String {
        let mut out = self.program.to_string();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// Empty unless stdout was [`StdoutSink::Capture`].
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}
