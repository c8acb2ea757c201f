//! Clap-free settings for a build run.

use camino::Utf8PathBuf;
use mnbuild_types::package::{MpirFork, PackageId};

/// Which packages to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    All,
    One(PackageId),
}

impl Selection {
    /// Selected packages in dependency order.
    pub fn packages(self) -> Vec<PackageId> {
        match self {
            Selection::All => PackageId::ALL.to_vec(),
            Selection::One(p) => vec![p],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainSettings {
    /// Overrides `ProgramFiles(x86)`.
    pub program_files: Option<Utf8PathBuf>,
    /// Value of `CL` for every compile.
    pub compiler_flags: String,
    pub tools_version: String,
}

impl Default for ToolchainSettings {
    fn default() -> Self {
        Self {
            program_files: None,
            compiler_flags: "/Zp8 /Ob2 /Oi /Ot /Og /GL /Qpar /arch:AVX2 /O2".to_string(),
            tools_version: "142".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuningSettings {
    /// Runs of the tuning program before giving up.
    pub attempts: u32,
    pub python: String,
}

impl Default for TuningSettings {
    fn default() -> Self {
        Self {
            attempts: 5,
            python: "python".to_string(),
        }
    }
}

/// One self-test: application arguments plus the MD5 of its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputCheck {
    pub args: Vec<String>,
    pub md5: String,
}

impl OutputCheck {
    pub fn new(args: &[&str], md5: &str) -> Self {
        Self {
            args: args.iter().map(|a| a.to_string()).collect(),
            md5: md5.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifySettings {
    /// Always run.
    pub primary: OutputCheck,
    /// Run with `--tests`.
    pub extended: Vec<OutputCheck>,
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self {
            primary: OutputCheck::new(
                &["-t", "1", "-n", "1", "-m", "3"],
                "33fa1d843d1bd1cdb320da884207801c",
            ),
            extended: vec![OutputCheck::new(
                &["-t", "5", "-n", "5", "-m", "3"],
                "c9284eaa72596095bb2efe9f95afb8e3",
            )],
        }
    }
}

impl VerifySettings {
    pub fn checks(&self, extended: bool) -> Vec<&OutputCheck> {
        let mut out = vec![&self.primary];
        if extended {
            out.extend(self.extended.iter());
        }
        out
    }
}

/// Everything a run needs to know, after CLI and config file are merged.
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    /// Directory holding the checkouts, `build` and `logs`.
    pub root: Utf8PathBuf,
    pub selection: Selection,
    pub mpir_fork: MpirFork,
    pub tune: bool,
    pub extended_tests: bool,
    pub clean: bool,
    pub toolchain: ToolchainSettings,
    pub tuning: TuningSettings,
    pub verify: VerifySettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_selects_in_dependency_order() {
        assert_eq!(
            Selection::All.packages(),
            vec![PackageId::Mpir, PackageId::Mpfr, PackageId::MerkurNewton]
        );
        assert_eq!(Selection::One(PackageId::Mpfr).packages(), vec![PackageId::Mpfr]);
    }

    #[test]
    fn extended_checks_follow_primary() {
        let verify = VerifySettings::default();
        assert_eq!(verify.checks(false).len(), 1);
        let all = verify.checks(true);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].md5, "33fa1d843d1bd1cdb320da884207801c");
        assert_eq!(all[1].args.join(" "), "-t 5 -n 5 -m 3");
    }
}
