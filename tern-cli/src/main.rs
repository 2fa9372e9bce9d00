use std::fs;
use std::io::{self, Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tern_core::{
    AllocStrategy, CompileOptions, CoreError, Diagnostic, compile, dump_ast, dump_tokens,
};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Compiler for the Tern language, producing x86-64 assembly.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source file or directory of `.tern` files (reads stdin when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output file (writes stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = RegAlloc::LinearScan)]
    regalloc: RegAlloc,

    #[arg(long, value_enum, default_value_t = Emit::Asm)]
    emit: Emit,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RegAlloc {
    Naive,
    LinearScan,
}

impl From<RegAlloc> for AllocStrategy {
    fn from(value: RegAlloc) -> Self {
        match value {
            RegAlloc::Naive => AllocStrategy::Naive,
            RegAlloc::LinearScan => AllocStrategy::LinearScan,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    Asm,
    Tokens,
    Ast,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    execute(cli)
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn execute(cli: Cli) -> Result<()> {
    let options = CompileOptions {
        strategy: cli.regalloc.into(),
    };

    if let Some(dir) = cli.input.as_ref().filter(|path| path.is_dir()) {
        if cli.output.is_some() {
            anyhow::bail!("--output cannot be combined with a directory input");
        }
        if cli.emit != Emit::Asm {
            anyhow::bail!("only assembly can be emitted for a directory input");
        }
        return compile_directory(dir, &options);
    }

    let (source, file) = match &cli.input {
        Some(path) => (
            fs::read_to_string(path)
                .with_context(|| format!("failed to read input file {}", path.display()))?,
            path.display().to_string(),
        ),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            (buffer, "<stdin>".to_string())
        }
    };

    let text = match cli.emit {
        Emit::Asm => compile(&source, &file, &options).map(|artifact| {
            print_diagnostics(&artifact.diagnostics);
            artifact.assembly
        }),
        Emit::Tokens => dump_tokens(&source, &file),
        Emit::Ast => dump_ast(&source, &file),
    }
    .inspect_err(report)?;

    match &cli.output {
        Some(path) => write_output(path, text.as_bytes())?,
        None => io::stdout()
            .write_all(text.as_bytes())
            .context("failed to write to stdout")?,
    }
    Ok(())
}

/// Compile every `.tern` file below `dir` to a sibling `.s` file.
///
/// Units are independent and compiled on scoped threads, at most one per
/// available core at a time.
fn compile_directory(dir: &Path, options: &CompileOptions) -> Result<()> {
    let mut units = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "tern") {
            units.push(path.to_path_buf());
        }
    }
    let workers = thread::available_parallelism().map_or(1, NonZeroUsize::get);
    tracing::info!(units = units.len(), workers, dir = %dir.display(), "compiling directory");

    let mut results: Vec<(&PathBuf, Result<()>)> = Vec::with_capacity(units.len());
    for batch in units.chunks(workers) {
        thread::scope(|scope| {
            let handles: Vec<_> = batch
                .iter()
                .map(|path| (path, scope.spawn(move || compile_unit(path, options))))
                .collect();
            for (path, handle) in handles {
                let result = handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("compiler thread panicked")));
                results.push((path, result));
            }
        });
    }

    let mut failed = 0;
    for (path, result) in &results {
        if let Err(err) = result {
            failed += 1;
            eprintln!("{}: {err:#}", path.display());
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} units failed to compile", results.len());
    }
    Ok(())
}

fn compile_unit(path: &Path, options: &CompileOptions) -> Result<()> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read input file {}", path.display()))?;
    let artifact = compile(&source, &path.display().to_string(), options).inspect_err(report)?;
    print_diagnostics(&artifact.diagnostics);
    let output = path.with_extension("s");
    write_output(&output, artifact.assembly.as_bytes())?;
    tracing::info!(output = %output.display(), "wrote assembly");
    Ok(())
}

/// Print the diagnostics of a failed pass to stderr.
fn report(err: &CoreError) {
    print_diagnostics(err.diagnostics());
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    let mut stderr = io::stderr().lock();
    for diagnostic in diagnostics {
        let _ = writeln!(stderr, "{diagnostic}");
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    fs::write(path, bytes)
        .with_context(|| format!("failed to write output file {}", path.display()))?;
    Ok(())
}
