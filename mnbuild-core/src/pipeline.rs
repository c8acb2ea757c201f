//! The build run and the three package pipelines.
//!
//! Every stage goes through the port traits; the only direct filesystem
//! work is below the [`BuildLayout`] and inside the checkouts.

use crate::compile::compile_targets;
use crate::error::{BuildError, BuildResult};
use crate::fsutil::{copy_dir_all, remove_path_forced};
use crate::ports::Ports;
use crate::repo::sync_repository;
use crate::settings::RunSettings;
use crate::toolchain::{Toolchain, resolve_toolchain};
use crate::{tuning, verify};
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use fs_err as fs;
use mnbuild_artifacts::{collect_artifacts, read_marker, write_marker, write_patch_diff, write_report};
use mnbuild_edit::{PatchReport, apply_patches, render_diff};
use mnbuild_hash::sha256_file;
use mnbuild_types::env::CompileEnv;
use mnbuild_types::layout::BuildLayout;
use mnbuild_types::package::{PackageDescriptor, PackageId, PackageVariant, Registry, WorkdirLayout};
use mnbuild_types::patch::{Edit, PatchSet};
use mnbuild_types::report::{PackageReport, RunReport, ToolInfo};
use tracing::{debug, info, warn};

/// Result of a run that did not hit a fatal error.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub report: RunReport,
}

impl BuildOutcome {
    /// 0 on success, 2 when an output checksum did not match.
    pub fn exit_code(&self) -> u8 {
        if self.report.verification_failed() { 2 } else { 0 }
    }
}

/// Shared, read-only state for the package pipelines.
pub(crate) struct BuildContext<'a> {
    pub settings: &'a RunSettings,
    pub layout: &'a BuildLayout,
    pub ports: Ports<'a>,
    pub toolchain: &'a Toolchain,
}

/// Run the selected package pipelines.
///
/// `logs/report.json` is written even when a fatal error ends the run, as
/// long as the logs directory exists.
pub fn run_build(settings: &RunSettings, ports: Ports<'_>, tool: ToolInfo) -> BuildResult<BuildOutcome> {
    let registry = Registry::builtin();
    registry.validate()?;

    let layout = BuildLayout::new(settings.root.clone());
    info!("working dir is {}", layout.root());
    if settings.clean {
        clean_all(&layout)?;
    }
    prepare_layout(&layout)?;

    let mut report = RunReport::new(tool);
    let result = build_packages(settings, &registry, &layout, ports, &mut report);
    report.ended_at = Some(Utc::now());
    if let Err(e) = write_report(&layout.report_path(), &report) {
        warn!("could not write run report: {:#}", e);
    }

    result?;
    Ok(BuildOutcome { report })
}

fn build_packages(
    settings: &RunSettings,
    registry: &Registry,
    layout: &BuildLayout,
    ports: Ports<'_>,
    report: &mut RunReport,
) -> BuildResult<()> {
    info!("preparing build environment");
    let toolchain = resolve_toolchain(&ports, &settings.toolchain)?;
    report.toolchain = Some(toolchain.info());

    let ctx = BuildContext {
        settings,
        layout,
        ports,
        toolchain: &toolchain,
    };

    for package in settings.selection.packages() {
        let variant = PackageVariant::for_package(package, settings.mpir_fork);
        let desc = registry.get(variant)?;
        let pkg = match package {
            PackageId::Mpir => build_mpir(&ctx, desc)?,
            PackageId::Mpfr => build_mpfr(&ctx, desc)?,
            PackageId::MerkurNewton => build_merkur_newton(&ctx, desc)?,
        };
        report.error_count += pkg.verifications.iter().filter(|v| !v.passed).count() as u64;
        report.packages.push(pkg);
    }
    Ok(())
}

/// Remove outputs and checkouts so the next run starts from scratch.
pub fn clean_all(layout: &BuildLayout) -> BuildResult<()> {
    for target in layout.clean_targets() {
        if !target.exists() {
            continue;
        }
        debug!("cleaning {}", target);
        remove_path_forced(&target)
            .map_err(|e| BuildError::Layout(format!("could not delete old {target}: {e:#}")))?;
        if target.exists() {
            return Err(BuildError::Layout(format!("could not delete old {target}")));
        }
    }
    Ok(())
}

/// Create `build` and `logs`, reusing existing directories.
pub fn prepare_layout(layout: &BuildLayout) -> BuildResult<()> {
    for dir in [&layout.build, &layout.logs] {
        if dir.exists() {
            if !dir.is_dir() {
                return Err(BuildError::Layout(format!(
                    "directory {dir} is blocked by existing file"
                )));
            }
            debug!("using existing directory {}", dir);
        } else {
            debug!("creating directory {}", dir);
            fs::create_dir_all(dir).map_err(|e| BuildError::Layout(e.to_string()))?;
        }
    }
    Ok(())
}

/// One package's pass through sync, patch, compile and collect.
pub(crate) struct PackageRun<'a> {
    pub ctx: &'a BuildContext<'a>,
    pub desc: &'a PackageDescriptor,
    pub checkout: Utf8PathBuf,
    pub workdir: Utf8PathBuf,
    pub log: Utf8PathBuf,
    pub patches: PatchReport,
    pub report: PackageReport,
}

impl<'a> PackageRun<'a> {
    /// Truncate the package log, sync the repository, prepare the working
    /// directory and apply the descriptor's patches.
    pub fn start(ctx: &'a BuildContext<'a>, desc: &'a PackageDescriptor) -> BuildResult<Self> {
        let package = desc.package();
        let log = ctx.layout.log_path(package);
        fs::write(&log, "").with_context(|| format!("truncate {log}"))?;

        let checkout = ctx.layout.checkout_dir(package);
        let sync = sync_repository(ctx.ports.git, &desc.repo, &checkout)?;
        debug!("{}: {:?}", checkout, sync);
        let workdir = prepare_workdir(desc, &checkout)?;

        let mut report = PackageReport::new(desc.variant, desc.repo.url.clone());
        report.sync = Some(sync);
        let mut run = Self {
            ctx,
            desc,
            checkout,
            workdir,
            log,
            patches: PatchReport::default(),
            report,
        };
        run.patch(&desc.patches)?;
        Ok(run)
    }

    pub fn package(&self) -> PackageId {
        self.desc.package()
    }

    /// Apply `patches` below the working directory and refresh the diff log.
    ///
    /// The diff log is left alone when no file changed.
    pub fn patch(&mut self, patches: &PatchSet) -> BuildResult<()> {
        if patches.is_empty() {
            return Ok(());
        }
        debug!("apply patches in {}", self.workdir);
        let applied = apply_patches(&self.workdir, patches)?;
        debug!(".. {} patch(es) applied", applied.applied);

        self.report.patches_applied += applied.applied;
        let changed = applied.changed_files().next().is_some();
        self.patches.merge(applied);
        if !changed {
            return Ok(());
        }
        let diff = render_diff(&self.checkout, &self.patches);
        write_patch_diff(&self.ctx.layout.patch_diff_path(self.package()), &diff)?;
        Ok(())
    }

    pub fn compile(&mut self, targets: &[String], env: &CompileEnv) -> BuildResult<()> {
        let built = compile_targets(
            self.ctx.ports.runner,
            &self.ctx.toolchain.command,
            targets,
            &self.workdir,
            env,
            &self.log,
        )?;
        self.report.targets_built.extend(built);
        Ok(())
    }

    /// Copy headers, libraries and executables from every result directory.
    pub fn collect(&mut self) -> BuildResult<()> {
        let dest = self.ctx.layout.output_dir(self.package());
        info!("copying includes and libs to {}", dest);
        for result in &self.desc.results {
            let source = result.resolve(&self.checkout, &self.workdir);
            let collected = collect_artifacts(&source, &dest)?;
            for path in &collected.copied {
                let sha = sha256_file(path).with_context(|| format!("hash {path}"))?;
                debug!("copied {} (sha256 {})", path, sha);
                self.report.artifacts.insert(self.ctx.layout.build_relative(path), sha);
            }
            self.report.artifacts_copied += collected.copied.len() as u64;
        }
        Ok(())
    }

    pub fn write_marker(&self) -> BuildResult<()> {
        if let Some(path) = self.ctx.layout.marker_path(self.package()) {
            write_marker(&path, &self.desc.marker_text())?;
        }
        Ok(())
    }

    pub fn finish(self) -> PackageReport {
        info!("{} done (log {})", self.desc.variant, self.log);
        self.report
    }
}

/// Resolve the working directory, copying the build variant on first use.
fn prepare_workdir(desc: &PackageDescriptor, checkout: &Utf8Path) -> BuildResult<Utf8PathBuf> {
    if let WorkdirLayout::Variant { source, .. } = &desc.workdir {
        let build = desc.workdir_in(checkout);
        if !build.exists() {
            let source = checkout.join(source);
            debug!("copying {} to {}", source, build);
            copy_dir_all(&source, &build)
                .with_context(|| format!("create build variant {build}"))?;
        }
    }

    let workdir = desc.workdir_in(checkout);
    if !workdir.is_dir() {
        return Err(BuildError::Layout(format!(
            "working directory {workdir} does not exist"
        )));
    }
    Ok(workdir)
}

fn build_mpir(ctx: &BuildContext<'_>, desc: &PackageDescriptor) -> BuildResult<PackageReport> {
    let mut run = PackageRun::start(ctx, desc)?;
    run.compile(&desc.targets, &ctx.toolchain.env)?;
    run.collect()?;
    run.write_marker()?;

    if ctx.settings.tune {
        let attempts = tuning::tune_mpir(&mut run)?;
        run.report.tuning_attempts = Some(attempts);
    }
    Ok(run.finish())
}

/// Base environment plus the mpir headers and libraries.
pub fn mpfr_env(base: &CompileEnv, layout: &BuildLayout) -> CompileEnv {
    let include = layout.include_dir(PackageId::Mpir);
    let lib = layout.lib_dir(PackageId::Mpir);
    base.derive()
        .append("CL", &format!("/I\"{include}\""))
        .append("_CL_", &format!("/link \"mpir.lib\" /LIBPATH:\"{lib}\""))
        .prepend_path("INCLUDE", include.as_str())
        .prepend_path("LIB", lib.as_str())
        .build()
}

fn build_mpfr(ctx: &BuildContext<'_>, desc: &PackageDescriptor) -> BuildResult<PackageReport> {
    let env = mpfr_env(&ctx.toolchain.env, ctx.layout);
    let mut run = PackageRun::start(ctx, desc)?;
    run.compile(&desc.targets, &env)?;
    run.collect()?;
    run.write_marker()?;
    Ok(run.finish())
}

/// Splice `"using lib_<name>"` in the application source with the marker text.
pub fn marker_patch(library: PackageId, marker: &str) -> PatchSet {
    PatchSet::new().rule(
        r"MerkurNewton\.cpp",
        vec![Edit::new(
            format!("\"using lib_{}\"", library.name()),
            format!("\"{marker}\""),
        )],
    )
}

fn build_merkur_newton(ctx: &BuildContext<'_>, desc: &PackageDescriptor) -> BuildResult<PackageReport> {
    let mut run = PackageRun::start(ctx, desc)?;

    for library in [PackageId::Mpir, PackageId::Mpfr] {
        let Some(path) = ctx.layout.marker_path(library) else {
            continue;
        };
        if let Some(marker) = read_marker(&path)? {
            debug!("using {}: {}", library, marker);
            run.patch(&marker_patch(library, &marker))?;
        }
    }

    run.compile(&desc.targets, &ctx.toolchain.env)?;
    run.collect()?;

    let exe = ctx
        .layout
        .bin_dir(PackageId::MerkurNewton)
        .join("MerkurNewton.exe");
    let checks = ctx.settings.verify.checks(ctx.settings.extended_tests);
    run.report.verifications = verify::self_test(
        ctx.ports.runner,
        &exe,
        ctx.layout.root(),
        &ctx.layout.testfile_path(),
        &checks,
    )?;
    Ok(run.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn scratch() -> (TempDir, BuildLayout) {
        let temp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8");
        (temp, BuildLayout::new(root))
    }

    #[test]
    fn prepare_creates_and_reuses_directories() {
        let (_temp, layout) = scratch();
        prepare_layout(&layout).unwrap();
        assert!(layout.build.is_dir() && layout.logs.is_dir());
        std::fs::write(layout.logs.join("keep.log"), "x").unwrap();
        prepare_layout(&layout).unwrap();
        assert!(layout.logs.join("keep.log").is_file());
    }

    #[test]
    fn file_blocking_build_dir_is_fatal() {
        let (_temp, layout) = scratch();
        std::fs::write(&layout.build, "not a dir").unwrap();
        let err = prepare_layout(&layout).unwrap_err();
        assert!(err.to_string().contains("blocked by existing file"));
    }

    #[test]
    fn clean_removes_outputs_and_checkouts() {
        let (_temp, layout) = scratch();
        prepare_layout(&layout).unwrap();
        std::fs::create_dir_all(layout.checkout_dir(PackageId::Mpfr).join(".git")).unwrap();
        std::fs::write(layout.root().join("mnbuild.toml"), "").unwrap();

        clean_all(&layout).unwrap();
        for target in layout.clean_targets() {
            assert!(!target.exists(), "{target} still exists");
        }
        assert!(layout.root().join("mnbuild.toml").exists());
    }

    #[test]
    fn mpfr_env_adds_mpir_paths_without_touching_base() {
        let layout = BuildLayout::new("/w");
        let base = CompileEnv::from_vars([
            ("CL", "/O2"),
            ("_CL_", "/link"),
            ("INCLUDE", "/sdk/include"),
        ]);
        let env = mpfr_env(&base, &layout);

        assert_eq!(env.get("CL"), Some("/O2 /I\"/w/build/mpir/include\""));
        assert_eq!(
            env.get("_CL_"),
            Some("/link /link \"mpir.lib\" /LIBPATH:\"/w/build/mpir/lib\"")
        );
        assert_eq!(env.get("INCLUDE"), Some("/w/build/mpir/include;/sdk/include"));
        assert_eq!(env.get("LIB"), Some("/w/build/mpir/lib"));
        assert_eq!(base.get("CL"), Some("/O2"));
    }

    #[test]
    fn marker_patch_keeps_quotes() {
        let set = marker_patch(PackageId::Mpfr, "using lib_mpfr (lib_mpfr from u)");
        let edit = &set.rules[0].edits[0];
        assert_eq!(edit.search, "\"using lib_mpfr\"");
        assert_eq!(edit.replace, "\"using lib_mpfr (lib_mpfr from u)\"");
    }

    #[test]
    fn outcome_exit_code_reflects_verification() {
        let tool = ToolInfo {
            name: "mnbuild".to_string(),
            version: None,
        };
        let mut outcome = BuildOutcome {
            report: RunReport::new(tool),
        };
        assert_eq!(outcome.exit_code(), 0);

        let mut pkg = PackageReport::new(PackageVariant::MerkurNewton, "u");
        pkg.verifications.push(mnbuild_types::report::Verification {
            args: vec![],
            expected_md5: "a".to_string(),
            actual_md5: "b".to_string(),
            passed: false,
        });
        outcome.report.packages.push(pkg);
        assert_eq!(outcome.exit_code(), 2);
    }
}
