//! Patch engine for checked-out package sources.
//!
//! Responsibilities:
//! - Walk a working directory and select files whose *name* fully matches
//!   a rule's pattern.
//! - Apply literal, single-line find/replace edits, skipping lines that
//!   already carry the replacement so repeated runs are no-ops.
//! - Render a unified diff of everything that changed.

mod error;

pub use error::{EditError, EditResult};

use camino::{Utf8Path, Utf8PathBuf};
use diffy::PatchFormatter;
use fs_err as fs;
use mnbuild_types::package::full_match_regex;
use mnbuild_types::patch::{Edit, PatchSet};
use tracing::{debug, trace};

/// Result of patching one piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedText {
    pub text: String,
    /// Edits whose search text occurred in a line, whether or not the line changed.
    pub applicable: u64,
}

/// One file that matched a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedFile {
    pub path: Utf8PathBuf,
    pub applicable: u64,
    pub before: String,
    pub after: String,
}

impl PatchedFile {
    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Total applicable edits over the whole walk.
    pub applied: u64,
    pub files: Vec<PatchedFile>,
}

impl PatchReport {
    pub fn changed_files(&self) -> impl Iterator<Item = &PatchedFile> {
        self.files.iter().filter(|f| f.changed())
    }

    pub fn merge(&mut self, other: PatchReport) {
        self.applied += other.applied;
        self.files.extend(other.files);
    }
}

/// Apply `edits` line by line.
///
/// For every line and every edit whose search text occurs in it, the edit
/// counts as applicable; the line is only rewritten when the replacement
/// text is not already present. Line endings are kept as they are.
pub fn patch_text(content: &str, edits: &[Edit]) -> PatchedText {
    let mut text = String::with_capacity(content.len());
    let mut applicable = 0;

    for (idx, line) in content.split_inclusive('\n').enumerate() {
        let mut line = line.to_string();
        for edit in edits {
            if !line.contains(&edit.search) {
                continue;
            }
            applicable += 1;
            if line.contains(&edit.replace) {
                trace!(line = idx + 1, search = %edit.search, "already patched");
                continue;
            }
            trace!(line = idx + 1, from = %edit.search, to = %edit.replace, "patching");
            line = line.replace(&edit.search, &edit.replace);
        }
        text.push_str(&line);
    }

    PatchedText { text, applicable }
}

/// Apply every rule of `patches` to the files below `root`.
///
/// Rules run in order; each rule walks the whole subtree. Every matched
/// file is written back in full, changed or not.
pub fn apply_patches(root: &Utf8Path, patches: &PatchSet) -> EditResult<PatchReport> {
    debug!(root = %root, rules = patches.rules.len(), "apply patches");

    if !root.is_dir() {
        return Err(EditError::MissingRoot(root.to_path_buf()));
    }

    let mut report = PatchReport::default();
    if patches.rules.is_empty() {
        debug!("{} patch(es) applied", report.applied);
        return Ok(report);
    }

    let files = files_below(root)?;
    for rule in &patches.rules {
        let re = full_match_regex(&rule.file_pattern).map_err(|source| {
            EditError::InvalidPattern {
                pattern: rule.file_pattern.clone(),
                source,
            }
        })?;
        trace!(pattern = %rule.file_pattern, "apply patch(es) to matching file names");

        for path in &files {
            let Some(name) = path.file_name() else {
                continue;
            };
            if !re.is_match(name) {
                continue;
            }
            trace!(path = %path, "patching file");

            let before = fs::read_to_string(path)?;
            let patched = patch_text(&before, &rule.edits);
            fs::write(path, &patched.text)?;

            report.applied += patched.applicable;
            report.files.push(PatchedFile {
                path: path.clone(),
                applicable: patched.applicable,
                before,
                after: patched.text,
            });
        }
    }

    debug!("{} patch(es) applied", report.applied);
    Ok(report)
}

/// Regular files below `root`, sorted, skipping `.git` internals.
fn files_below(root: &Utf8Path) -> EditResult<Vec<Utf8PathBuf>> {
    let walk_err = |message: String| EditError::Walk {
        root: root.to_path_buf(),
        message,
    };

    let pattern = format!("{}/**/*", glob::Pattern::escape(root.as_str()));
    let mut out = Vec::new();
    for entry in glob::glob(&pattern).map_err(|e| walk_err(e.to_string()))? {
        let path = entry.map_err(|e| walk_err(e.to_string()))?;
        let Ok(path) = Utf8PathBuf::from_path_buf(path) else {
            debug!("skipping non-UTF-8 path below {}", root);
            continue;
        };
        if path.components().any(|c| c.as_str() == ".git") {
            continue;
        }
        if path.is_file() {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Unified diff of every changed file, paths relative to `root`.
pub fn render_diff(root: &Utf8Path, report: &PatchReport) -> String {
    let mut out = String::new();
    let formatter = PatchFormatter::new();

    for file in report.changed_files() {
        let rel = file.path.strip_prefix(root).unwrap_or(&file.path);
        let rel = rel.as_str().replace('\\', "/");

        out.push_str(&format!("diff --git a/{0} b/{0}\n", rel));
        out.push_str(&format!("--- a/{0}\n+++ b/{0}\n", rel));

        let patch = diffy::create_patch(&file.before, &file.after);
        out.push_str(&formatter.fmt_patch(&patch).to_string());
        if !out.ends_with('\n') {
            out.push('\n');
        }
    }

    out
}
