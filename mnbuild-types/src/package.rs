//! Typed registry of the packages mnbuild knows how to build.
//!
//! Every buildable variant has exactly one [`PackageDescriptor`]. The
//! registry is validated once at startup so a broken pattern or an empty
//! target list fails before any repository is touched.

use crate::patch::{Edit, PatchSet};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// The three packages of the build chain, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PackageId {
    #[serde(rename = "mpir")]
    Mpir,
    #[serde(rename = "mpfr")]
    Mpfr,
    #[serde(rename = "MerkurNewton")]
    MerkurNewton,
}

impl PackageId {
    pub const ALL: [PackageId; 3] = [PackageId::Mpir, PackageId::Mpfr, PackageId::MerkurNewton];

    /// Name used for the checkout directory, the build output folder and the log file.
    pub fn name(self) -> &'static str {
        match self {
            PackageId::Mpir => "mpir",
            PackageId::Mpfr => "mpfr",
            PackageId::MerkurNewton => "MerkurNewton",
        }
    }

    /// Libraries publish a marker file for downstream packages; the application does not.
    pub fn marker_file_name(self) -> Option<&'static str> {
        match self {
            PackageId::Mpir => Some("using_mpir.h"),
            PackageId::Mpfr => Some("using_mpfr.h"),
            PackageId::MerkurNewton => None,
        }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PackageId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PackageId::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| RegistryError::UnknownPackage(s.to_string()))
    }
}

/// Which fork of mpir to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MpirFork {
    BrianGladman,
    #[default]
    KevinHake,
}

impl MpirFork {
    pub fn author(self) -> &'static str {
        match self {
            MpirFork::BrianGladman => "BrianGladman",
            MpirFork::KevinHake => "KevinHake",
        }
    }
}

impl fmt::Display for MpirFork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.author())
    }
}

/// One buildable variant: a package plus, for mpir, the fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PackageVariant {
    Mpir(MpirFork),
    Mpfr,
    MerkurNewton,
}

impl PackageVariant {
    pub fn package(self) -> PackageId {
        match self {
            PackageVariant::Mpir(_) => PackageId::Mpir,
            PackageVariant::Mpfr => PackageId::Mpfr,
            PackageVariant::MerkurNewton => PackageId::MerkurNewton,
        }
    }

    /// Registry key, e.g. `mpir-KevinHake` or `mpfr`.
    pub fn key(self) -> String {
        match self {
            PackageVariant::Mpir(fork) => format!("mpir-{}", fork.author()),
            other => other.package().name().to_string(),
        }
    }

    pub fn for_package(package: PackageId, fork: MpirFork) -> Self {
        match package {
            PackageId::Mpir => PackageVariant::Mpir(fork),
            PackageId::Mpfr => PackageVariant::Mpfr,
            PackageId::MerkurNewton => PackageVariant::MerkurNewton,
        }
    }
}

impl fmt::Display for PackageVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Where a package's source lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSource {
    pub url: String,
    pub branch: String,
}

/// Working directory inside a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkdirLayout {
    /// Build directly in this subdirectory.
    Single(Utf8PathBuf),
    /// Copy `source` to `build` once and build in the copy.
    Variant {
        source: Utf8PathBuf,
        build: Utf8PathBuf,
    },
}

/// Anchor for a result directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultBase {
    Checkout,
    Workdir,
}

/// A directory the build driver leaves artifacts in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultDir {
    pub base: ResultBase,
    pub rel: Utf8PathBuf,
}

impl ResultDir {
    pub fn resolve(&self, checkout: &Utf8Path, workdir: &Utf8Path) -> Utf8PathBuf {
        match self.base {
            ResultBase::Checkout => checkout.join(&self.rel),
            ResultBase::Workdir => workdir.join(&self.rel),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub variant: PackageVariant,
    pub repo: RepoSource,
    pub workdir: WorkdirLayout,
    /// Build targets, in build order. The first one is the primary target.
    pub targets: Vec<String>,
    pub patches: PatchSet,
    pub results: Vec<ResultDir>,
}

impl PackageDescriptor {
    pub fn package(&self) -> PackageId {
        self.variant.package()
    }

    pub fn primary_target(&self) -> Option<&str> {
        self.targets.first().map(String::as_str)
    }

    /// Single-line text recorded in the marker file and spliced into the application.
    pub fn marker_text(&self) -> String {
        format!(
            "using lib_{} ({} from {})",
            self.package().name(),
            self.primary_target().unwrap_or_default(),
            self.repo.url
        )
    }

    /// Resolve the working directory below a checkout.
    pub fn workdir_in(&self, checkout: &Utf8Path) -> Utf8PathBuf {
        match &self.workdir {
            WorkdirLayout::Single(dir) => join_relative(checkout, dir),
            WorkdirLayout::Variant { build, .. } => join_relative(checkout, build),
        }
    }
}

fn join_relative(base: &Utf8Path, rel: &Utf8Path) -> Utf8PathBuf {
    if rel.as_str() == "." {
        base.to_path_buf()
    } else {
        base.join(rel)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown package '{0}' (expected one of: mpir, mpfr, MerkurNewton)")]
    UnknownPackage(String),

    #[error("no descriptor registered for {0}")]
    MissingDescriptor(String),

    #[error("duplicate descriptor for {0}")]
    Duplicate(String),

    #[error("{variant}: {message}")]
    Invalid { variant: String, message: String },
}

/// All package descriptors.
#[derive(Debug, Clone)]
pub struct Registry {
    descriptors: Vec<PackageDescriptor>,
}

impl Registry {
    pub fn new(descriptors: Vec<PackageDescriptor>) -> Self {
        Self { descriptors }
    }

    /// The descriptors for the mpir forks, mpfr and MerkurNewton.
    pub fn builtin() -> Self {
        Self::new(vec![
            mpir_brian_gladman(),
            mpir_kevin_hake(),
            mpfr(),
            merkur_newton(),
        ])
    }

    pub fn descriptors(&self) -> &[PackageDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, variant: PackageVariant) -> Result<&PackageDescriptor, RegistryError> {
        self.descriptors
            .iter()
            .find(|d| d.variant == variant)
            .ok_or_else(|| RegistryError::MissingDescriptor(variant.key()))
    }

    /// Check every descriptor and require one per package.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let mut seen = BTreeSet::new();
        for desc in &self.descriptors {
            if !seen.insert(desc.variant) {
                return Err(RegistryError::Duplicate(desc.variant.key()));
            }
            validate_descriptor(desc)?;
        }
        for package in PackageId::ALL {
            if !self.descriptors.iter().any(|d| d.package() == package) {
                return Err(RegistryError::MissingDescriptor(package.name().to_string()));
            }
        }
        Ok(())
    }
}

fn validate_descriptor(desc: &PackageDescriptor) -> Result<(), RegistryError> {
    let invalid = |message: String| RegistryError::Invalid {
        variant: desc.variant.key(),
        message,
    };

    if desc.repo.url.trim().is_empty() {
        return Err(invalid("empty repository url".to_string()));
    }
    if desc.repo.branch.trim().is_empty() {
        return Err(invalid("empty branch".to_string()));
    }
    if desc.targets.is_empty() {
        return Err(invalid("no build targets".to_string()));
    }
    if let Some(t) = desc.targets.iter().find(|t| t.trim().is_empty()) {
        return Err(invalid(format!("blank build target {t:?}")));
    }
    if desc.results.is_empty() {
        return Err(invalid("no result directories".to_string()));
    }
    if let WorkdirLayout::Variant { source, build } = &desc.workdir
        && source == build
    {
        return Err(invalid(format!("build variant {build} equals its source")));
    }
    for rule in &desc.patches.rules {
        full_match_regex(&rule.file_pattern)
            .map_err(|e| invalid(format!("bad file pattern {:?}: {e}", rule.file_pattern)))?;
        if rule.edits.iter().any(|e| e.search.is_empty()) {
            return Err(invalid(format!(
                "empty search text in rule {:?}",
                rule.file_pattern
            )));
        }
    }
    Ok(())
}

/// Compile `pattern` so that it only matches a whole string.
pub fn full_match_regex(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

fn repo(url: &str) -> RepoSource {
    RepoSource {
        url: url.to_string(),
        branch: "master".to_string(),
    }
}

fn targets(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn lib_results() -> ResultDir {
    ResultDir {
        base: ResultBase::Checkout,
        rel: Utf8PathBuf::from("lib/x64/Release"),
    }
}

fn mpir_brian_gladman() -> PackageDescriptor {
    PackageDescriptor {
        variant: PackageVariant::Mpir(MpirFork::BrianGladman),
        repo: repo("https://github.com/BrianGladman/mpir.git"),
        workdir: WorkdirLayout::Single(Utf8PathBuf::from("msvc/vs19")),
        targets: targets(&["lib_mpir_gc", "lib_mpir_cxx"]),
        patches: PatchSet::new(),
        results: vec![lib_results()],
    }
}

fn mpir_kevin_hake() -> PackageDescriptor {
    let lib_speed = r"$(SolutionDir)..\lib_speed\$(IntDir)lib_speed.lib";
    PackageDescriptor {
        variant: PackageVariant::Mpir(MpirFork::KevinHake),
        repo: repo("https://github.com/KevinHake/mpir.git"),
        workdir: WorkdirLayout::Variant {
            source: Utf8PathBuf::from("build.vc15"),
            build: Utf8PathBuf::from("build.vc16"),
        },
        targets: targets(&["lib_mpir_haswell_avx", "lib_mpir_cxx"]),
        patches: PatchSet::new().rule(
            r".*\.vcxproj",
            vec![
                Edit::new(r"prebuild haswell\avx x64 15", r"prebuild haswell\avx x64 16"),
                Edit::new(r#"postbuild "$(TargetPath)" 15"#, r#"postbuild "$(TargetPath)" 16"#),
                Edit::new(
                    "check_config $(Platform) $(Configuration) 15</Command>",
                    "check_config $(Platform) $(Configuration) 16</Command>",
                ),
                Edit::new(r"$(SolutionDir)$(IntDir)lib_speed.lib", lib_speed),
                Edit::new(r"$(OutDir)lib_speed.lib", lib_speed),
            ],
        ),
        results: vec![lib_results()],
    }
}

fn mpfr() -> PackageDescriptor {
    PackageDescriptor {
        variant: PackageVariant::Mpfr,
        repo: repo("https://github.com/BrianGladman/mpfr.git"),
        workdir: WorkdirLayout::Single(Utf8PathBuf::from("build.vs19")),
        targets: targets(&["lib_mpfr"]),
        patches: PatchSet::new(),
        results: vec![
            lib_results(),
            ResultDir {
                base: ResultBase::Workdir,
                rel: Utf8PathBuf::from("lib/x64/Release"),
            },
        ],
    }
}

fn merkur_newton() -> PackageDescriptor {
    PackageDescriptor {
        variant: PackageVariant::MerkurNewton,
        repo: repo("https://github.com/wgahr123/MerkurNewton.git"),
        workdir: WorkdirLayout::Single(Utf8PathBuf::from(".")),
        targets: targets(&["MerkurNewton"]),
        patches: PatchSet::new().rule(r".*\.vcxproj", vec![Edit::new("BUILDWIN", r"..\build")]),
        results: vec![ResultDir {
            base: ResultBase::Workdir,
            rel: Utf8PathBuf::from("MerkurNewton/x64/Release"),
        }],
    }
}
