//! Files the pipeline produces: collected build results, dependency
//! markers, the patch diff and the run report.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use mnbuild_types::report::RunReport;
use tracing::{debug, trace};

/// Where a build result goes below a package's output root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Header,
    Library,
    Executable,
}

impl ArtifactKind {
    /// Classify by extension, ignoring ASCII case.
    pub fn from_path(path: &Utf8Path) -> Option<Self> {
        let ext = path.extension()?;
        if ext.eq_ignore_ascii_case("h") {
            Some(ArtifactKind::Header)
        } else if ext.eq_ignore_ascii_case("lib") {
            Some(ArtifactKind::Library)
        } else if ext.eq_ignore_ascii_case("exe") {
            Some(ArtifactKind::Executable)
        } else {
            None
        }
    }

    pub fn subdir(self) -> &'static str {
        match self {
            ArtifactKind::Header => "include",
            ArtifactKind::Library => "lib",
            ArtifactKind::Executable => "bin",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectReport {
    /// Destination paths, in copy order.
    pub copied: Vec<Utf8PathBuf>,
    /// Source files with an extension nobody collects.
    pub skipped: Vec<Utf8PathBuf>,
}

impl CollectReport {
    pub fn merge(&mut self, other: CollectReport) {
        self.copied.extend(other.copied);
        self.skipped.extend(other.skipped);
    }
}

/// Copy the regular files directly inside `source` into
/// `<dest_root>/{include,lib,bin}`.
///
/// Subdirectories of `source` are not descended into. A destination
/// folder is only created when the first file for it is copied.
pub fn collect_artifacts(source: &Utf8Path, dest_root: &Utf8Path) -> anyhow::Result<CollectReport> {
    debug!("collect results from {}", source);
    if !source.is_dir() {
        anyhow::bail!("result directory {} does not exist", source);
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(source)? {
        let entry = entry.with_context(|| format!("read entry in {}", source))?;
        let path = Utf8PathBuf::from_path_buf(entry.path())
            .map_err(|p| anyhow::anyhow!("non UTF-8 path {}", p.display()))?;
        if path.is_file() {
            entries.push(path);
        }
    }
    entries.sort();

    let mut report = CollectReport::default();
    for path in entries {
        let Some(kind) = ArtifactKind::from_path(&path) else {
            trace!("skip {}", path);
            report.skipped.push(path);
            continue;
        };
        let Some(name) = path.file_name() else {
            continue;
        };

        let dir = dest_root.join(kind.subdir());
        if !dir.is_dir() {
            fs::create_dir_all(&dir).with_context(|| format!("create {}", dir))?;
        }
        let dest = dir.join(name);
        trace!("copy {} -> {}", path, dest);
        fs::copy(&path, &dest)?;
        report.copied.push(dest);
    }

    debug!("{} file(s) collected from {}", report.copied.len(), source);
    Ok(report)
}

/// Write a one-line dependency marker, without a line terminator.
pub fn write_marker(path: &Utf8Path, text: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent))?;
    }
    fs::write(path, text).with_context(|| format!("write marker {}", path))?;
    debug!("marker {}: {}", path, text);
    Ok(())
}

/// First line of a marker file, or `None` when the dependency was never built.
pub fn read_marker(path: &Utf8Path) -> anyhow::Result<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(content.lines().next().map(|l| l.trim().to_string()))
}

pub fn write_patch_diff(path: &Utf8Path, diff: &str) -> anyhow::Result<()> {
    fs::write(path, diff).with_context(|| format!("write {}", path))?;
    Ok(())
}

pub fn write_report(path: &Utf8Path, report: &RunReport) -> anyhow::Result<()> {
    let s = serde_json::to_string_pretty(report).context("serialize report")?;
    fs::write(path, s).with_context(|| format!("write {}", path))?;
    Ok(())
}
