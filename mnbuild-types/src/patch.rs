use serde::{Deserialize, Serialize};

/// A literal, single-line find/replace edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    pub search: String,
    pub replace: String,
}

impl Edit {
    pub fn new(search: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            search: search.into(),
            replace: replace.into(),
        }
    }
}

/// Ordered edits for every file whose name fully matches `file_pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRule {
    /// Regular expression matched against the whole file name (not the path).
    pub file_pattern: String,
    pub edits: Vec<Edit>,
}

/// Patch rules in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSet {
    pub rules: Vec<PatchRule>,
}

impl PatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, file_pattern: impl Into<String>, edits: Vec<Edit>) -> Self {
        self.rules.push(PatchRule {
            file_pattern: file_pattern.into(),
            edits,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.iter().all(|r| r.edits.is_empty())
    }

    pub fn edit_count(&self) -> usize {
        self.rules.iter().map(|r| r.edits.len()).sum()
    }
}
