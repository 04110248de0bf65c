#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, Subcommand};
use miette::IntoDiagnostic;
use rayon::prelude::*;
use tracing_subscriber::EnvFilter;

use labelflow::manifest::{self, ResolvedManifest};
use labelflow::{CompileConfig, Prelude, compile_named};

#[derive(Parser, Debug)]
#[command(name = "labelflow", version, about = "Security-label annotation compiler")]
struct Cli {
    /// Parse annotations but emit the plain program. Overrides `labelflow.toml`.
    #[arg(long, global = true)]
    no_instrument: bool,

    /// Name of the label runtime object. Overrides `labelflow.toml`.
    #[arg(long, global = true)]
    runtime: Option<String>,

    /// More log output (repeatable). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Compile source files; outputs are concatenated in argument order.
    Compile {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Write to this file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Parse and instrument source files, reporting diagnostics only.
    Check {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.cmd {
        Cmd::Compile { paths, out } => {
            let text = compile_all(&cli, paths)?.concat();
            match out {
                Some(out) => fs::write(out, text).into_diagnostic()?,
                None => print!("{text}"),
            }
            Ok(())
        }
        Cmd::Check { paths } => {
            compile_all(&cli, paths)?;
            tracing::info!(files = paths.len(), "no errors");
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Each file is an independent unit; results keep argument order.
fn compile_all(cli: &Cli, paths: &[PathBuf]) -> miette::Result<Vec<String>> {
    paths.par_iter().map(|path| compile_file(cli, path)).collect()
}

fn compile_file(cli: &Cli, path: &Path) -> miette::Result<String> {
    let resolved = manifest::load_resolved_manifest(path)?;
    let config = build_compile_config(cli, &resolved)?;
    let src = fs::read_to_string(path).into_diagnostic()?;
    tracing::info!(path = %path.display(), enabled = config.instrument.enabled, "compiling");
    compile_named(&display_path(path), &src, &config)
}

fn build_compile_config(cli: &Cli, resolved: &ResolvedManifest) -> miette::Result<CompileConfig> {
    let mut instrument = resolved.instrument_config();
    if cli.no_instrument {
        instrument.enabled = false;
    }
    if let Some(runtime) = &cli.runtime {
        instrument.names.annotations = runtime.clone();
    }

    let prelude = match &resolved.prelude {
        Some(path) => Some(Prelude {
            name: display_path(path),
            source: fs::read_to_string(path).into_diagnostic()?,
        }),
        None => None,
    };
    Ok(CompileConfig { instrument, prelude })
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
