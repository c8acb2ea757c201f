use crate::error::{BuildError, BuildResult};
use crate::ports::ProcessRunner;
use crate::process::{ProcessSpec, StdoutSink};
use crate::settings::OutputCheck;
use anyhow::Context;
use camino::Utf8Path;
use mnbuild_hash::{digest_eq, md5_file};
use mnbuild_types::report::Verification;
use tracing::{error, info};

/// Smoke-test the collected application and compare output checksums.
///
/// Every run starts in `cwd`. The `--help` output goes to the console. A
/// program that cannot be started or exits non-zero is fatal. A checksum
/// mismatch is logged and recorded with `passed = false`.
pub fn self_test(
    runner: &dyn ProcessRunner,
    exe: &Utf8Path,
    cwd: &Utf8Path,
    testfile: &Utf8Path,
    checks: &[&OutputCheck],
) -> BuildResult<Vec<Verification>> {
    info!("testing {}", exe);
    if !exe.is_file() {
        return Err(BuildError::process(exe.as_str(), "not found in build output"));
    }

    let help = ProcessSpec::new(exe)
        .args(["--help"])
        .cwd(cwd)
        .stdout(StdoutSink::Inherit);
    run_checked(runner, &help)?;

    let mut results = Vec::with_capacity(checks.len());
    for check in checks {
        let spec = ProcessSpec::new(exe)
            .args(check.args.iter().cloned())
            .cwd(cwd)
            .stdout(StdoutSink::Truncate(testfile.to_path_buf()));
        run_checked(runner, &spec)?;

        let actual = md5_file(testfile).with_context(|| format!("hash {testfile}"))?;
        let passed = digest_eq(&actual, &check.md5);
        if passed {
            info!("test succeeded ({})", check.args.join(" "));
        } else {
            error!("test failed (md5: {}, expected {})", actual, check.md5);
        }
        results.push(Verification {
            args: check.args.clone(),
            expected_md5: check.md5.clone(),
            actual_md5: actual,
            passed,
        });
    }

    if results.iter().all(|v| v.passed) {
        info!("{} is ready to use", exe);
    }
    Ok(results)
}

fn run_checked(runner: &dyn ProcessRunner, spec: &ProcessSpec) -> BuildResult<()> {
    let out = runner
        .run(spec)
        .map_err(|e| BuildError::process(spec.display_name(), format!("{e:#}")))?;
    if !out.success() {
        return Err(BuildError::process(
            spec.display_name(),
            format!("could not run {} (exit code {:?})", spec.command_line(), out.code),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessOutput;
    use camino::Utf8PathBuf;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Writes `output` to the truncate sink; fails when called with `fail_arg`.
    struct FakeApp {
        output: &'static [u8],
        fail_arg: Option<&'static str>,
        calls: Mutex<Vec<ProcessSpec>>,
    }

    impl FakeApp {
        fn new(output: &'static [u8], fail_arg: Option<&'static str>) -> Self {
            Self {
                output,
                fail_arg,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ProcessRunner for FakeApp {
        fn run(&self, spec: &ProcessSpec) -> anyhow::Result<ProcessOutput> {
            self.calls.lock().expect("lock").push(spec.clone());
            if let Some(arg) = self.fail_arg
                && spec.args.iter().any(|a| a == arg)
            {
                return Ok(ProcessOutput::failed(3, "crash"));
            }
            if let StdoutSink::Truncate(path) = &spec.stdout {
                std::fs::write(path, self.output)?;
            }
            Ok(ProcessOutput::ok(""))
        }
    }

    fn scratch() -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8");
        std::fs::write(root.join("MerkurNewton.exe"), "").expect("exe");
        (temp, root)
    }

    #[test]
    fn matching_and_mismatching_checksums_are_recorded() {
        let (_temp, root) = scratch();
        let app = FakeApp::new(b"root 1\n", None);
        let good = OutputCheck::new(&["-t", "1"], &mnbuild_hash::md5_hex(b"root 1\n"));
        let bad = OutputCheck::new(&["-t", "5"], "00000000000000000000000000000000");

        let results = self_test(
            &app,
            &root.join("MerkurNewton.exe"),
            &root,
            &root.join("testfile.log"),
            &[&good, &bad],
        )
        .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].passed);
        assert!(!results[1].passed);
        assert_eq!(results[1].actual_md5, mnbuild_hash::md5_hex(b"root 1\n"));
    }

    #[test]
    fn help_goes_to_console_and_every_run_starts_in_root() {
        let (_temp, root) = scratch();
        let app = FakeApp::new(b"x", None);
        let check = OutputCheck::new(&["-t", "1"], &mnbuild_hash::md5_hex(b"x"));
        self_test(
            &app,
            &root.join("MerkurNewton.exe"),
            &root,
            &root.join("testfile.log"),
            &[&check],
        )
        .unwrap();

        let calls = app.calls.lock().expect("lock");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args, vec!["--help"]);
        assert_eq!(calls[0].stdout, StdoutSink::Inherit);
        assert_eq!(calls[1].stdout, StdoutSink::Truncate(root.join("testfile.log")));
        assert!(calls.iter().all(|c| c.cwd.as_ref() == Some(&root)));
    }

    #[test]
    fn checksum_comparison_ignores_case() {
        let (_temp, root) = scratch();
        let app = FakeApp::new(b"x", None);
        let check = OutputCheck::new(&["-t", "1"], &mnbuild_hash::md5_hex(b"x").to_uppercase());
        let results = self_test(
            &app,
            &root.join("MerkurNewton.exe"),
            &root,
            &root.join("testfile.log"),
            &[&check],
        )
        .unwrap();
        assert!(results[0].passed);
    }

    #[test]
    fn failing_help_is_fatal() {
        let (_temp, root) = scratch();
        let app = FakeApp::new(b"", Some("--help"));
        let err = self_test(
            &app,
            &root.join("MerkurNewton.exe"),
            &root,
            &root.join("testfile.log"),
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::Process { .. }));
    }

    #[test]
    fn missing_executable_is_fatal() {
        let (_temp, root) = scratch();
        let app = FakeApp::new(b"", None);
        let err = self_test(
            &app,
            &root.join("absent.exe"),
            &root,
            &root.join("testfile.log"),
            &[],
        )
        .unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert!(app.calls.lock().expect("lock").is_empty());
    }
}
