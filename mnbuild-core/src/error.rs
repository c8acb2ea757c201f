use mnbuild_edit::EditError;
use mnbuild_types::package::RegistryError;

/// Fatal pipeline errors. Every variant aborts the run with exit code 1;
/// checksum mismatches are not errors and only show up in the report.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("package registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("{0}")]
    Layout(String),

    #[error("toolchain discovery: {0}")]
    Discovery(String),

    #[error("repository {url}: {message}")]
    RepoSync { url: String, message: String },

    #[error("patching failed: {0}")]
    Patch(#[from] EditError),

    #[error("could not compile {target} (exit code {})", fmt_code(.code))]
    Compile { target: String, code: Option<i32> },

    #[error("tuning: {0}")]
    Tuning(String),

    #[error("{program}: {message}")]
    Process { program: String, message: String },

    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl BuildError {
    pub fn exit_code(&self) -> u8 {
        1
    }

    pub(crate) fn process(program: impl Into<String>, message: impl Into<String>) -> Self {
        BuildError::Process {
            program: program.into(),
            message: message.into(),
        }
    }
}

fn fmt_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "none, terminated by signal".to_string(),
    }
}

pub type BuildResult<T> = Result<T, BuildError>;
