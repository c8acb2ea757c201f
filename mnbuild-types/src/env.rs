//! Compile environment snapshots and the shared compile command.
//!
//! A [`CompileEnv`] is immutable. Pipelines that need extra search paths
//! or flags call [`CompileEnv::derive`] and build a child snapshot, so the
//! base captured from the toolchain script is never changed.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Separator for list-valued variables such as `INCLUDE`, `LIB` and `PATH`.
pub const PATH_LIST_SEPARATOR: char = ';';

/// Variable names are matched ASCII case-insensitively, like the Windows
/// process environment; the spelling of the first insertion is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileEnv {
    vars: BTreeMap<String, String>,
}

impl CompileEnv {
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut out = BTreeMap::new();
        for (k, v) in vars {
            insert_ci(&mut out, k.into(), v.into());
        }
        Self { vars: out }
    }

    /// Parse the output of `set`: one `NAME=VALUE` per line. Lines without
    /// `=` and lines with an empty name are ignored.
    pub fn parse_set_output(stdout: &str) -> Self {
        Self::from_vars(stdout.lines().filter_map(|line| {
            let line = line.trim_end_matches('\r');
            let (name, value) = line.split_once('=')?;
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.to_string()))
        }))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .or_else(|| {
                self.vars
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Start a child snapshot with overrides on top of this one.
    pub fn derive(&self) -> EnvOverrides {
        EnvOverrides {
            vars: self.vars.clone(),
        }
    }
}

/// Builder for a child [`CompileEnv`].
#[derive(Debug, Clone)]
#[must_use]
pub struct EnvOverrides {
    vars: BTreeMap<String, String>,
}

impl EnvOverrides {
    pub fn set(mut self, name: &str, value: impl Into<String>) -> Self {
        insert_ci(&mut self.vars, name.to_string(), value.into());
        self
    }

    /// Append `suffix` separated by a space (compiler flag variables).
    pub fn append(mut self, name: &str, suffix: &str) -> Self {
        let value = match lookup_ci(&self.vars, name) {
            Some(old) if !old.is_empty() => format!("{old} {suffix}"),
            _ => suffix.to_string(),
        };
        insert_ci(&mut self.vars, name.to_string(), value);
        self
    }

    /// Put `entry` in front of a `;`-separated list variable.
    pub fn prepend_path(mut self, name: &str, entry: &str) -> Self {
        let value = match lookup_ci(&self.vars, name) {
            Some(old) if !old.is_empty() => format!("{entry}{PATH_LIST_SEPARATOR}{old}"),
            _ => entry.to_string(),
        };
        insert_ci(&mut self.vars, name.to_string(), value);
        self
    }

    pub fn build(self) -> CompileEnv {
        CompileEnv { vars: self.vars }
    }
}

fn lookup_ci<'a>(vars: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    vars.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn insert_ci(vars: &mut BTreeMap<String, String>, name: String, value: String) {
    let existing = vars.keys().find(|k| k.eq_ignore_ascii_case(&name)).cloned();
    vars.insert(existing.unwrap_or(name), value);
}

/// Build-driver invocation shared by every package. The target is appended per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileCommand {
    pub program: Utf8PathBuf,
    pub args: Vec<String>,
}

impl CompileCommand {
    /// Arguments for building one target.
    pub fn args_for(&self, target: &str) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(target.to_string());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_set_output_splits_on_first_equals() {
        let env = CompileEnv::parse_set_output(
            "Path=C:\\bin;C:\\tools\r\nCL=/O2\r\n=C:=C:\\\r\nnot a var\r\nX=a=b\r\n",
        );
        assert_eq!(env.get("PATH"), Some("C:\\bin;C:\\tools"));
        assert_eq!(env.get("CL"), Some("/O2"));
        assert_eq!(env.get("X"), Some("a=b"));
        assert_eq!(env.len(), 3);
    }

    #[test]
    fn lookups_ignore_case() {
        let env = CompileEnv::from_vars([("Path", "x")]);
        assert_eq!(env.get("PATH"), Some("x"));
        assert!(env.contains("path"));
    }

    #[test]
    fn derive_leaves_base_untouched() {
        let base = CompileEnv::from_vars([("CL", "/O2"), ("LIB", "C:\\sdk\\lib")]);
        let child = base
            .derive()
            .append("CL", "/I\"C:\\build\\mpir\\include\"")
            .prepend_path("lib", "C:\\build\\mpir\\lib")
            .set("TOOLSET", "14.29")
            .build();

        assert_eq!(base.get("CL"), Some("/O2"));
        assert!(!base.contains("TOOLSET"));
        assert_eq!(child.get("CL"), Some("/O2 /I\"C:\\build\\mpir\\include\""));
        assert_eq!(child.get("LIB"), Some("C:\\build\\mpir\\lib;C:\\sdk\\lib"));
        assert_eq!(child.get("TOOLSET"), Some("14.29"));
        // Original key spelling survives a differently-cased override.
        assert!(child.iter().any(|(k, _)| k == "LIB"));
    }

    #[test]
    fn append_and_prepend_on_missing_vars() {
        let child = CompileEnv::default()
            .derive()
            .append("_CL_", "/link")
            .prepend_path("INCLUDE", "C:\\inc")
            .build();
        assert_eq!(child.get("_CL_"), Some("/link"));
        assert_eq!(child.get("INCLUDE"), Some("C:\\inc"));
    }

    #[test]
    fn args_for_appends_target_last() {
        let cmd = CompileCommand {
            program: Utf8PathBuf::from("msbuild.exe"),
            args: vec!["/t:Rebuild".to_string()],
        };
        assert_eq!(cmd.args_for("lib_mpfr"), vec!["/t:Rebuild", "lib_mpfr"]);
        assert_eq!(cmd.args.len(), 1);
    }
}
