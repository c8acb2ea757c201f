use crate::package::PackageId;
use camino::{Utf8Path, Utf8PathBuf};

pub const BUILD_SUBDIR: &str = "build";
pub const LOGS_SUBDIR: &str = "logs";

/// Directory roots for one run. Created once at startup and passed to
/// every component that reads or writes below them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayout {
    pub root: Utf8PathBuf,
    pub build: Utf8PathBuf,
    pub logs: Utf8PathBuf,
}

impl BuildLayout {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        let root = root.into();
        Self {
            build: root.join(BUILD_SUBDIR),
            logs: root.join(LOGS_SUBDIR),
            root,
        }
    }

    /// Local checkout of a package's repository.
    pub fn checkout_dir(&self, package: PackageId) -> Utf8PathBuf {
        self.root.join(package.name())
    }

    /// Per-package output root holding `include`, `lib` and `bin`.
    pub fn output_dir(&self, package: PackageId) -> Utf8PathBuf {
        self.build.join(package.name())
    }

    pub fn include_dir(&self, package: PackageId) -> Utf8PathBuf {
        self.output_dir(package).join("include")
    }

    pub fn lib_dir(&self, package: PackageId) -> Utf8PathBuf {
        self.output_dir(package).join("lib")
    }

    pub fn bin_dir(&self, package: PackageId) -> Utf8PathBuf {
        self.output_dir(package).join("bin")
    }

    pub fn marker_path(&self, package: PackageId) -> Option<Utf8PathBuf> {
        package.marker_file_name().map(|name| self.build.join(name))
    }

    pub fn log_path(&self, package: PackageId) -> Utf8PathBuf {
        self.logs.join(format!("{}.log", package.name()))
    }

    pub fn patch_diff_path(&self, package: PackageId) -> Utf8PathBuf {
        self.logs.join(format!("{}.patch.diff", package.name()))
    }

    pub fn testfile_path(&self) -> Utf8PathBuf {
        self.logs.join("testfile.log")
    }

    pub fn report_path(&self) -> Utf8PathBuf {
        self.logs.join("report.json")
    }

    /// Everything `--clean` removes, in removal order.
    pub fn clean_targets(&self) -> Vec<Utf8PathBuf> {
        let mut out = vec![self.build.clone(), self.logs.clone()];
        out.extend(PackageId::ALL.iter().map(|p| self.checkout_dir(*p)));
        out
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// `path` relative to `build` with `/` separators, as the report keys it.
    pub fn build_relative(&self, path: &Utf8Path) -> String {
        let rel = path.strip_prefix(&self.build).unwrap_or(path);
        rel.components()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }
}
