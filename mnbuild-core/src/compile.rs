use crate::error::{BuildError, BuildResult};
use crate::ports::ProcessRunner;
use crate::process::{ProcessSpec, StdoutSink};
use camino::Utf8Path;
use mnbuild_types::env::{CompileCommand, CompileEnv};
use tracing::{info, warn};

/// Build `targets` in order inside `workdir`, appending driver output to `log`.
///
/// The first failing target stops the loop; later targets are not attempted.
pub fn compile_targets(
    runner: &dyn ProcessRunner,
    command: &CompileCommand,
    targets: &[String],
    workdir: &Utf8Path,
    env: &CompileEnv,
    log: &Utf8Path,
) -> BuildResult<Vec<String>> {
    let mut built = Vec::with_capacity(targets.len());
    for target in targets {
        info!("compiling {}", target);
        let spec = ProcessSpec::new(command.program.clone())
            .args(command.args_for(target))
            .cwd(workdir)
            .env(env)
            .stdout(StdoutSink::Append(log.to_path_buf()));

        let out = runner
            .run(&spec)
            .map_err(|e| BuildError::process(spec.display_name(), format!("{e:#}")))?;
        for line in out.stderr.lines().filter(|l| !l.trim().is_empty()) {
            warn!("{}", line);
        }
        if !out.success() {
            info!("driver output for {} is in {}", target, log);
            return Err(BuildError::Compile {
                target: target.clone(),
                code: out.code,
            });
        }
        built.push(target.clone());
    }
    Ok(built)
}
