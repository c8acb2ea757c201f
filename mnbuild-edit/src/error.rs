//! Error types for mnbuild-edit.

use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditError {
    /// A file-name pattern is not a valid regular expression.
    #[error("invalid file pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The patch root does not exist or is not a directory.
    #[error("patch root {0} is not a directory")]
    MissingRoot(Utf8PathBuf),

    /// Walking the tree failed.
    #[error("walk {root}: {message}")]
    Walk { root: Utf8PathBuf, message: String },

    /// Reading or writing a matched file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type EditResult<T> = Result<T, EditError>;
