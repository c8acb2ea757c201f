//! mpir tuning: build the tuning tools, generate `gmp-mparam.h`, rebuild.

use crate::error::{BuildError, BuildResult};
use crate::pipeline::PackageRun;
use crate::ports::ProcessRunner;
use crate::process::{ProcessSpec, StdoutSink};
use anyhow::Context;
use camino::Utf8Path;
use fs_err as fs;
use mnbuild_types::env::CompileEnv;
use mnbuild_types::layout::BuildLayout;
use mnbuild_types::package::PackageId;
use mnbuild_types::patch::{Edit, PatchSet};
use tracing::{debug, info, warn};

const TUNING_TARGETS: [&str; 5] = [
    r"mpir-tests\add-test-lib",
    r"mpir-tune\lib_speed",
    r"mpir-tune\speed",
    r"mpir-tune\try",
    r"mpir-tune\tune",
];

/// Points the test helper library at the intermediate directory the
/// tuning projects actually write it to.
pub fn test_config_patch() -> PatchSet {
    PatchSet::new().rule(
        r"test-config\.props",
        vec![Edit::new(
            r"$(MPLIBS);$(OutDir)\add-test-lib.lib",
            r"$(MPLIBS);..\..\mpir-tests\add-test-lib\$(IntDir)add-test-lib.lib",
        )],
    )
}

/// Base environment plus the checkout's test headers and the libraries the
/// tuning programs link against.
pub fn tuning_env(base: &CompileEnv, layout: &BuildLayout, checkout: &Utf8Path, workdir: &Utf8Path) -> CompileEnv {
    base.derive()
        .append("CL", &format!("/I{}", checkout.join("tests")))
        .append("_CL_", &format!("/LIBPATH:\"{}\"", layout.lib_dir(PackageId::Mpir)))
        .append(
            "_CL_",
            &format!("/LIBPATH:\"{}\"", workdir.join("mpir-tests").join("add-test-lib")),
        )
        .append(
            "_CL_",
            &format!("/LIBPATH:\"{}\"", workdir.join("mpir-tune").join("lib_speed")),
        )
        .build()
}

/// Tune an mpir build that has already been compiled and collected.
///
/// Returns the number of tuning program runs it took.
pub(crate) fn tune_mpir(run: &mut PackageRun<'_>) -> BuildResult<u32> {
    info!("tuning (creating gmp-mparam.h)");
    let ctx = run.ctx;
    let runner = ctx.ports.runner;
    let workdir = run.workdir.clone();
    let tuning_dir = workdir.join("mpir-tune").join("tune");

    run.patch(&test_config_patch())?;

    debug!("preparing tuning sources in {}", tuning_dir);
    let prebuild = ProcessSpec::new(ctx.settings.tuning.python.as_str())
        .args(["tune_prebuild.py"])
        .cwd(&tuning_dir)
        .env(&ctx.toolchain.env)
        .stdout(StdoutSink::Append(run.log.clone()));
    let out = runner
        .run(&prebuild)
        .map_err(|e| BuildError::process(prebuild.display_name(), format!("{e:#}")))?;
    for line in out.stderr.lines().filter(|l| !l.trim().is_empty()) {
        warn!("{}", line);
    }
    if !out.success() {
        return Err(BuildError::Tuning("could not prepare the tuning sources".to_string()));
    }

    let env = tuning_env(&ctx.toolchain.env, ctx.layout, &run.checkout, &workdir);
    let targets: Vec<String> = TUNING_TARGETS.iter().map(|t| t.to_string()).collect();
    run.compile(&targets, &env)?;

    let mparam = workdir
        .join("lib_mpir_cxx")
        .join("x64")
        .join("Release")
        .join("gmp-mparam.h");
    if let Some(parent) = mparam.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {parent}"))?;
    }
    let tune_exe = tuning_dir.join("x64").join("Release").join("tune.exe");
    let attempts = run_tune(
        runner,
        &tune_exe,
        &tuning_dir,
        &env,
        &mparam,
        ctx.settings.tuning.attempts,
    )?;
    info!("created gmp-mparam.h");

    debug!("compiling again with tuned parameters");
    let primary: Vec<String> = run.desc.primary_target().into_iter().map(str::to_string).collect();
    run.compile(&primary, &env)?;
    run.collect()?;
    Ok(attempts)
}

/// Run the tuning program until it succeeds, at most `max_attempts` times.
/// Its standard output replaces `mparam` on every attempt.
pub fn run_tune(
    runner: &dyn ProcessRunner,
    tune_exe: &Utf8Path,
    cwd: &Utf8Path,
    env: &CompileEnv,
    mparam: &Utf8Path,
    max_attempts: u32,
) -> BuildResult<u32> {
    for attempt in 1..=max_attempts {
        let spec = ProcessSpec::new(tune_exe)
            .cwd(cwd)
            .env(env)
            .stdout(StdoutSink::Truncate(mparam.to_path_buf()))
            .high_priority();
        let out = runner
            .run(&spec)
            .map_err(|e| BuildError::process(spec.display_name(), format!("{e:#}")))?;
        if out.success() {
            return Ok(attempt);
        }
        debug!("could not create gmp-mparam.h (attempt {} of {})", attempt, max_attempts);
    }
    Err(BuildError::Tuning(format!(
        "could not create gmp-mparam.h after {max_attempts} attempt(s)"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessOutput;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Fails the first `failures` runs, then succeeds.
    struct FlakyTune {
        failures: u32,
        runs: Mutex<Vec<ProcessSpec>>,
    }

    impl ProcessRunner for FlakyTune {
        fn run(&self, spec: &ProcessSpec) -> anyhow::Result<ProcessOutput> {
            let mut runs = self.runs.lock().expect("lock");
            runs.push(spec.clone());
            if runs.len() as u32 <= self.failures {
                Ok(ProcessOutput::failed(1, "out of memory"))
            } else {
                Ok(ProcessOutput::ok(""))
            }
        }
    }

    fn flaky(failures: u32) -> FlakyTune {
        FlakyTune {
            failures,
            runs: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn retries_until_success() {
        let runner = flaky(2);
        let attempts = run_tune(
            &runner,
            Utf8Path::new("/t/tune.exe"),
            Utf8Path::new("/t"),
            &CompileEnv::default(),
            Utf8Path::new("/t/gmp-mparam.h"),
            5,
        )
        .unwrap();

        assert_eq!(attempts, 3);
        let runs = runner.runs.lock().expect("lock");
        assert_eq!(runs.len(), 3);
        assert!(runs.iter().all(|s| s.high_priority));
        assert_eq!(runs[0].stdout, StdoutSink::Truncate("/t/gmp-mparam.h".into()));
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let runner = flaky(10);
        let err = run_tune(
            &runner,
            Utf8Path::new("/t/tune.exe"),
            Utf8Path::new("/t"),
            &CompileEnv::default(),
            Utf8Path::new("/t/gmp-mparam.h"),
            4,
        )
        .unwrap_err();

        assert!(matches!(err, BuildError::Tuning(_)));
        assert_eq!(runner.runs.lock().expect("lock").len(), 4);
    }

    #[test]
    fn env_adds_test_headers_and_libpaths() {
        let layout = BuildLayout::new("/w");
        let base = CompileEnv::from_vars([("CL", "/O2")]);
        let env = tuning_env(
            &base,
            &layout,
            Utf8Path::new("/w/mpir"),
            Utf8Path::new("/w/mpir/msvc/vs19"),
        );

        assert_eq!(env.get("CL"), Some("/O2 /I/w/mpir/tests"));
        assert_eq!(
            env.get("_CL_"),
            Some(
                "/LIBPATH:\"/w/build/mpir/lib\" \
                 /LIBPATH:\"/w/mpir/msvc/vs19/mpir-tests/add-test-lib\" \
                 /LIBPATH:\"/w/mpir/msvc/vs19/mpir-tune/lib_speed\""
            )
        );
    }

    #[test]
    fn test_config_patch_is_single_rule() {
        let set = test_config_patch();
        assert_eq!(set.edit_count(), 1);
        assert_eq!(set.rules[0].file_pattern, r"test-config\.props");
    }
}
