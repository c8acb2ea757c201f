//! Toolchain discovery and the base compile environment.
//!
//! Steps, each of which aborts the run when it finds nothing:
//! 1. Installation path: `vswhere`, else the newest amd64 `msbuild.exe`
//!    below `ProgramFiles(x86)`.
//! 2. Environment script: `VsDevCmd.bat`, else `vcvarsall.bat`.
//! 3. Toolset: the last candidate the [`ToolsetProbe`] accepts.
//! 4. Environment capture: script followed by `set`.
//! 5. Build driver on the captured `PATH`.
//! 6. Newest Windows 10 SDK.

use crate::error::{BuildError, BuildResult};
use crate::fsutil::{find_files, subdirs};
use crate::ports::{Ports, ProcessRunner, ToolsetProbe};
use crate::process::ProcessSpec;
use crate::settings::ToolchainSettings;
use camino::{Utf8Path, Utf8PathBuf};
use mnbuild_types::env::{CompileCommand, CompileEnv, PATH_LIST_SEPARATOR};
use mnbuild_types::report::ToolchainInfo;
use mnbuild_types::version::{Version, compare_versions, newest};
use std::cmp::Ordering;
use tracing::{debug, error, info, trace};

pub const DRIVER_EXE: &str = "msbuild.exe";

const VSWHERE_ARGS: [&str; 5] = [
    "-latest",
    "-requires",
    "Microsoft.Component.MSBuild",
    "-property",
    "installationPath",
];

/// Edition directories that mark a Visual Studio installation root.
const EDITIONS: [&str; 4] = ["BuildTools", "Community", "Professional", "Enterprise"];

const ENV_SCRIPTS: [(&str, &[&str]); 2] = [
    ("VsDevCmd.bat", &["-arch=amd64", "-no_logo"]),
    ("vcvarsall.bat", &["x64"]),
];

/// Toolsets probed before the ones installed under `VC\Tools\MSVC`.
const LEGACY_TOOLSETS: [&str; 2] = ["9.0", "14.0"];

/// Environment-initialization script, invoked from its own directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvScript {
    pub dir: Utf8PathBuf,
    pub name: String,
    pub args: Vec<String>,
}

impl EnvScript {
    pub fn path(&self) -> Utf8PathBuf {
        self.dir.join(&self.name)
    }

    /// Script call selecting `toolset`.
    pub fn call(&self, toolset: &str) -> String {
        let mut line = self.name.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line.push_str(&format!(" -vcvars_ver={toolset}"));
        line
    }
}

/// `cmd.exe` line that succeeds only when the toolset's compiler starts.
pub fn toolset_probe_spec(script: &EnvScript, toolset: &str) -> ProcessSpec {
    ProcessSpec::shell(format!("@echo off & {} & cl -?", script.call(toolset))).cwd(&script.dir)
}

/// `cmd.exe` line printing the environment the script leaves behind.
pub fn env_capture_spec(script: &EnvScript, toolset: &str) -> ProcessSpec {
    ProcessSpec::shell(format!("@echo off & {} & set", script.call(toolset))).cwd(&script.dir)
}

/// Resolved toolchain plus the base environment and compile command shared
/// by every package.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub install_path: Utf8PathBuf,
    pub env_script: EnvScript,
    pub toolset: String,
    pub msbuild: Utf8PathBuf,
    pub sdk_version: String,
    pub env: CompileEnv,
    pub command: CompileCommand,
}

impl Toolchain {
    pub fn info(&self) -> ToolchainInfo {
        ToolchainInfo {
            install_path: self.install_path.to_string(),
            env_script: self.env_script.path().to_string(),
            toolset: self.toolset.clone(),
            msbuild: self.msbuild.to_string(),
            sdk_version: self.sdk_version.clone(),
        }
    }
}

fn discovery(message: impl Into<String>) -> BuildError {
    BuildError::Discovery(message.into())
}

pub fn program_files_x86(settings: &ToolchainSettings) -> BuildResult<Utf8PathBuf> {
    if let Some(dir) = &settings.program_files {
        return Ok(dir.clone());
    }
    std::env::var("ProgramFiles(x86)")
        .map(Utf8PathBuf::from)
        .map_err(|_| discovery("ProgramFiles(x86) is not set"))
}

pub fn resolve_toolchain(ports: &Ports<'_>, settings: &ToolchainSettings) -> BuildResult<Toolchain> {
    let program_files = program_files_x86(settings)?;

    let install_path = find_install_path(ports, &program_files)?;
    debug!("using INSTALLPATH: {}", install_path);

    let env_script = find_env_script(&install_path)?;
    debug!("using environment set by {}", env_script.path());

    let toolset = select_toolset(ports.toolset, &env_script, &install_path)?;
    debug!("using toolset {}", toolset);

    let captured = capture_environment(ports.runner, &env_script, &toolset)?;
    let msbuild = resolve_driver(&captured, &env_script.dir)?;
    debug!("using {}", msbuild);

    let sdk_version = find_sdk_version(&program_files)?;
    debug!("using Windows SDK Version {}", sdk_version);

    let env = captured
        .derive()
        .set("TOOLSET", toolset.clone())
        .set("MSBUILD_PATH", msbuild.to_string())
        .set("CL", settings.compiler_flags.clone())
        .set("_CL_", "/link")
        .build();
    let command = compile_command(&msbuild, &env, &sdk_version, settings);
    trace!("compile command: {} {}", command.program, command.args.join(" "));

    Ok(Toolchain {
        install_path,
        env_script,
        toolset,
        msbuild,
        sdk_version,
        env,
        command,
    })
}

/// Installation root of the newest Visual Studio that offers the build driver.
pub fn find_install_path(ports: &Ports<'_>, program_files: &Utf8Path) -> BuildResult<Utf8PathBuf> {
    if let Some(path) = query_vswhere(ports.runner, program_files) {
        return Ok(path);
    }

    debug!("searching the newest {} below {}", DRIVER_EXE, program_files);
    let drivers = find_files(program_files, DRIVER_EXE).map_err(|e| discovery(format!("{e:#}")))?;
    let candidates = drivers
        .into_iter()
        .filter(|p| p.components().any(|c| c.as_str().eq_ignore_ascii_case("amd64")))
        .map(|p| {
            let version = ports.version.file_version(&p);
            trace!("{} has version {:?}", p, version);
            (p, version)
        });
    let (driver, version) =
        newest(candidates).ok_or_else(|| discovery("could not find any msbuild.exe for amd64"))?;
    debug!("newest build driver {} ({})", driver, version);

    install_path_from_driver(&driver, program_files)
        .ok_or_else(|| discovery(format!("could not find INSTALLPATH above {driver}")))
}

fn query_vswhere(runner: &dyn ProcessRunner, program_files: &Utf8Path) -> Option<Utf8PathBuf> {
    let vswhere = program_files
        .join("Microsoft Visual Studio")
        .join("Installer")
        .join("vswhere.exe");
    if !vswhere.is_file() {
        debug!("{} not found", vswhere);
        return None;
    }

    let spec = ProcessSpec::new(vswhere).args(VSWHERE_ARGS);
    match runner.run(&spec) {
        Ok(out) if out.success() => out
            .stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(Utf8PathBuf::from),
        Ok(out) => {
            debug!("vswhere exited with {:?}", out.code);
            None
        }
        Err(e) => {
            debug!("vswhere failed: {:#}", e);
            None
        }
    }
}

/// Edition directory above `driver`, else the first directory below
/// `program_files` whose name ends in `0` (versioned installs like `14.0`).
pub fn install_path_from_driver(driver: &Utf8Path, program_files: &Utf8Path) -> Option<Utf8PathBuf> {
    let mut dirs: Vec<&Utf8Path> = driver
        .ancestors()
        .skip(1)
        .filter(|d| d.starts_with(program_files) && *d != program_files)
        .collect();
    dirs.reverse();

    let is_edition = |name: &str| EDITIONS.iter().any(|e| name.eq_ignore_ascii_case(e));
    dirs.iter()
        .find(|d| d.file_name().is_some_and(is_edition))
        .or_else(|| dirs.iter().find(|d| d.file_name().is_some_and(|n| n.ends_with('0'))))
        .map(|d| d.to_path_buf())
}

/// First environment script found below the installation path or its parent.
pub fn find_env_script(install_path: &Utf8Path) -> BuildResult<EnvScript> {
    for (name, args) in ENV_SCRIPTS {
        let mut found = find_files(install_path, name).map_err(|e| discovery(format!("{e:#}")))?;
        if found.is_empty()
            && let Some(parent) = install_path.parent()
        {
            found = find_files(parent, name).map_err(|e| discovery(format!("{e:#}")))?;
        }
        if let Some(dir) = found.first().and_then(|p| p.parent()) {
            return Ok(EnvScript {
                dir: dir.to_path_buf(),
                name: name.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
            });
        }
    }
    Err(discovery("could not find script to set the environment for the compiler"))
}

/// Candidate toolsets in probe order.
pub fn toolset_candidates(install_path: &Utf8Path) -> Vec<String> {
    let mut out: Vec<String> = LEGACY_TOOLSETS.iter().map(|s| s.to_string()).collect();

    let msvc = install_path.join("VC").join("Tools").join("MSVC");
    if msvc.is_dir() {
        match subdirs(&msvc) {
            Ok(dirs) => {
                let mut installed: Vec<(String, Option<Version>)> = dirs
                    .into_iter()
                    .map(|(name, _)| {
                        let version = name.parse().ok();
                        (name, version)
                    })
                    .collect();
                installed.sort_by(|a, b| match compare_versions(a.1.as_ref(), b.1.as_ref()) {
                    Ordering::Equal => a.0.cmp(&b.0),
                    other => other,
                });
                out.extend(installed.into_iter().map(|(name, _)| name));
            }
            Err(e) => debug!("cannot list {}: {:#}", msvc, e),
        }
    }
    out
}

/// The last usable candidate wins.
pub fn select_toolset(
    probe: &dyn ToolsetProbe,
    script: &EnvScript,
    install_path: &Utf8Path,
) -> BuildResult<String> {
    let mut usable = Vec::new();
    for candidate in toolset_candidates(install_path) {
        trace!("checking toolset {}", candidate);
        match probe.is_usable(script, &candidate) {
            Ok(true) => usable.push(candidate),
            Ok(false) => {}
            Err(e) => debug!("probing toolset {} failed: {:#}", candidate, e),
        }
    }
    debug!("found toolsets {:?}", usable);
    usable
        .pop()
        .ok_or_else(|| discovery("no usable toolset found"))
}

pub fn capture_environment(
    runner: &dyn ProcessRunner,
    script: &EnvScript,
    toolset: &str,
) -> BuildResult<CompileEnv> {
    debug!("get environment: {}", script.call(toolset));
    let spec = env_capture_spec(script, toolset);
    let out = runner
        .run(&spec)
        .map_err(|e| BuildError::process(spec.display_name(), format!("{e:#}")))?;
    if !out.success() {
        for line in out.stderr.lines() {
            error!("{}", line);
        }
        return Err(discovery("could not get environment for the compiler"));
    }

    let env = CompileEnv::parse_set_output(&out.stdout);
    for (name, value) in env.iter() {
        trace!("{}={}", name, value);
    }
    if env.is_empty() {
        return Err(discovery("environment script printed no variables"));
    }
    Ok(env)
}

/// Absolute path of the build driver, looked up on the captured `PATH`.
pub fn resolve_driver(env: &CompileEnv, cwd: &Utf8Path) -> BuildResult<Utf8PathBuf> {
    let path_var = env
        .get("PATH")
        .ok_or_else(|| discovery("captured environment has no PATH"))?;
    let entries = path_var
        .split(PATH_LIST_SEPARATOR)
        .map(|s| s.trim().trim_matches('"'))
        .filter(|s| !s.is_empty());
    let search = std::env::join_paths(entries).map_err(|e| discovery(format!("bad PATH entry: {e}")))?;

    let found = which::which_in(DRIVER_EXE, Some(search), cwd)
        .map_err(|e| discovery(format!("could not get path of used {DRIVER_EXE}: {e}")))?;
    Utf8PathBuf::from_path_buf(found)
        .map_err(|p| discovery(format!("non UTF-8 driver path {}", p.display())))
}

/// Highest `10.0.*` directory under `Windows Kits\10\bin`, compared numerically.
pub fn find_sdk_version(program_files: &Utf8Path) -> BuildResult<String> {
    let bin = program_files.join("Windows Kits").join("10").join("bin");
    let dirs = if bin.is_dir() {
        subdirs(&bin).map_err(|e| discovery(format!("{e:#}")))?
    } else {
        Vec::new()
    };

    let found: Vec<String> = dirs
        .into_iter()
        .map(|(name, _)| name)
        .filter(|name| name.starts_with("10.0."))
        .collect();
    debug!("found Windows SDK Versions {:?}", found);

    newest(found.into_iter().map(|name| {
        let version = name.parse().ok();
        (name, version)
    }))
    .map(|(name, _)| name)
    .ok_or_else(|| discovery("could not find any installed Windows SDK Version 10.0"))
}

/// `NUMBER_OF_PROCESSORS` from the captured environment, else the host's parallelism.
pub fn processor_count(env: &CompileEnv) -> usize {
    env.get("NUMBER_OF_PROCESSORS")
        .and_then(|n| n.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
}

pub fn compile_command(
    msbuild: &Utf8Path,
    env: &CompileEnv,
    sdk_version: &str,
    settings: &ToolchainSettings,
) -> CompileCommand {
    let n = processor_count(env);
    info!("compiling with {} processes", n);
    CompileCommand {
        program: msbuild.to_path_buf(),
        args: vec![
            "/t:Rebuild".to_string(),
            "/nr:false".to_string(),
            "/verbosity:d".to_string(),
            format!("/m:{n}"),
            format!("/p:CL_MPCount={n}"),
            "/p:Platform=x64".to_string(),
            "/p:Configuration=Release".to_string(),
            format!("/p:WindowsTargetPlatformVersion={sdk_version}"),
            "/p:BuildProjectReferences=false".to_string(),
            format!("/p:ToolsVersion={}", settings.tools_version),
        ],
    }
}
