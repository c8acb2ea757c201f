mod config;
mod demo;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use config::{CliRun, ConfigMerger};
use mnbuild_core::adapters::{MsbuildVersionProbe, ShellGitPort, ShellToolsetProbe, SystemRunner};
use mnbuild_core::ports::Ports;
use mnbuild_core::run_build;
use mnbuild_core::settings::Selection;
use mnbuild_types::package::{MpirFork, PackageId};
use mnbuild_types::report::ToolInfo;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "mnbuild",
    version,
    about = "Create the MerkurNewton executable: fetch, patch and build mpir, mpfr and MerkurNewton."
)]
struct Cli {
    /// What to compile.
    #[arg(value_enum, required_unless_present = "testcolors")]
    package: Option<PackageArg>,

    /// Write more messages.
    #[arg(short, long)]
    verbose: bool,

    /// Write debug messages.
    #[arg(short, long)]
    debug: bool,

    /// Tune mpir after building it.
    #[arg(short = 'u', long)]
    tune: bool,

    /// Run the extended self-tests.
    #[arg(short, long)]
    tests: bool,

    /// Delete outputs and checkouts before building.
    #[arg(long)]
    clean: bool,

    /// Show source file and line of every message.
    #[arg(short, long)]
    lineno: bool,

    /// Show examples of every message class and exit.
    #[arg(short = 'c', long)]
    testcolors: bool,

    /// Don't colorize messages.
    #[arg(short, long)]
    nocolor: bool,

    /// Fork of mpir to build.
    #[arg(long, value_enum, default_value = "KevinHake", alias = "repo_author_mpir")]
    repo_author_mpir: ForkArg,

    /// Directory holding the checkouts, `build` and `logs`.
    #[arg(long, default_value = ".")]
    root: Utf8PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PackageArg {
    All,
    Mpir,
    Mpfr,
    #[value(name = "MerkurNewton")]
    MerkurNewton,
}

impl PackageArg {
    fn selection(self) -> Selection {
        match self {
            PackageArg::All => Selection::All,
            PackageArg::Mpir => Selection::One(PackageId::Mpir),
            PackageArg::Mpfr => Selection::One(PackageId::Mpfr),
            PackageArg::MerkurNewton => Selection::One(PackageId::MerkurNewton),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ForkArg {
    #[value(name = "BrianGladman")]
    BrianGladman,
    #[value(name = "KevinHake")]
    KevinHake,
}

impl From<ForkArg> for MpirFork {
    fn from(arg: ForkArg) -> Self {
        match arg {
            ForkArg::BrianGladman => MpirFork::BrianGladman,
            ForkArg::KevinHake => MpirFork::KevinHake,
        }
    }
}

fn main() -> ExitCode {
    match real_main() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:?}", e);
            ExitCode::from(1)
        }
    }
}

fn real_main() -> anyhow::Result<u8> {
    let cli = Cli::parse();
    init_tracing(&cli);

    if cli.testcolors {
        demo::show(!cli.nocolor);
        return Ok(0);
    }
    debug!("options: {:?}", cli);

    let Some(package) = cli.package else {
        anyhow::bail!("no package given");
    };
    let root = std::path::absolute(&cli.root)
        .with_context(|| format!("root directory {}", cli.root))?;
    let root = Utf8PathBuf::from_path_buf(root)
        .map_err(|p| anyhow::anyhow!("non UTF-8 root directory {}", p.display()))?;
    anyhow::ensure!(root.is_dir(), "root directory {} does not exist", root);

    let file_config = config::load_or_default(&root).context("load mnbuild.toml config")?;
    let settings = ConfigMerger::new(file_config).merge(CliRun {
        root,
        selection: package.selection(),
        mpir_fork: cli.repo_author_mpir.into(),
        tune: cli.tune,
        extended_tests: cli.tests,
        clean: cli.clean,
    })?;
    debug!("settings: {:?}", settings);

    let runner = SystemRunner;
    let git = ShellGitPort;
    let toolset = ShellToolsetProbe::default();
    let version = MsbuildVersionProbe;
    let ports = Ports {
        runner: &runner,
        git: &git,
        toolset: &toolset,
        version: &version,
    };
    let tool = ToolInfo {
        name: "mnbuild".to_string(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    };

    match run_build(&settings, ports, tool) {
        Ok(outcome) => {
            let code = outcome.exit_code();
            if code == 0 {
                info!("build finished");
            } else {
                error!("{} self-test(s) failed", outcome.report.error_count);
            }
            Ok(code)
        }
        Err(e) => {
            error!("{}", e);
            Ok(e.exit_code())
        }
    }
}

fn init_tracing(cli: &Cli) {
    let default = if cli.debug {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!cli.nocolor)
        .with_file(cli.lineno)
        .with_line_number(cli.lineno)
        .with_target(false)
        .without_time()
        .init();
}
