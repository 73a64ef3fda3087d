//! Run command implementation for cellar CLI.
//!
//! Loads a notebook, replays what the cache holds, executes the rest and
//! prints every code cell's output.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, bail};
use cellar_core::{
    CacheDirs, CacheMode, ExecutionController, FileStore, Kernel, MemoryStore, RunReport,
    SessionStore,
};
use cellar_script::ScriptKernel;
use cellar_sync::{
    Footer, HtmlGenerator, IpynbGenerator, Notebook, export_source, parse_assignment,
};
use chrono::Local;
use clap::Args;
use tracing::{info, warn};

use crate::colors;
use crate::progress::ProgressCallback;

/// Arguments of `cellar run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the notebook (.cellar file)
    #[arg(required_unless_present = "import_ipynb", conflicts_with = "import_ipynb")]
    pub notebook: Option<PathBuf>,

    /// Set a notebook parameter (repeatable)
    #[arg(long = "param", value_name = "NAME=VALUE")]
    pub params: Vec<String>,

    /// Neither read nor write the cache
    #[arg(long, conflicts_with = "ignore_cache")]
    pub disable_cache: bool,

    /// Execute every cell, overwriting cache entries
    #[arg(long)]
    pub ignore_cache: bool,

    /// Disambiguator appended to the notebook identity
    #[arg(long, value_name = "TAG")]
    pub cache_tag: Option<String>,

    /// Cache directory (default: <temp dir>/cellar-cache)
    #[arg(long, env = "CELLAR_CACHE_DIR", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Parse and assemble the notebook without executing it
    #[arg(long)]
    pub no_exec: bool,

    /// Check every code cell for syntax errors before running
    #[arg(long)]
    pub check_syntax: bool,

    /// Do not append the footer cell
    #[arg(long)]
    pub disable_footer: bool,

    /// Build the notebook from an existing .ipynb file
    #[arg(long, value_name = "PATH")]
    pub import_ipynb: Option<PathBuf>,

    /// Write the notebook with outputs as .ipynb (`-` for stdout)
    #[arg(long, value_name = "PATH")]
    pub export_ipynb: Option<String>,

    /// Write the notebook with outputs as HTML (`-` for stdout)
    #[arg(long, value_name = "PATH")]
    pub export_html: Option<String>,

    /// Write the notebook back as .cellar source (`-` for stdout)
    #[arg(long, value_name = "PATH", requires = "no_exec")]
    pub export_source: Option<String>,
}

/// Execute a notebook.
pub fn execute(args: &RunArgs) -> anyhow::Result<()> {
    let started = Local::now();
    let start = Instant::now();

    let mut notebook = load(args)?;
    info!(
        "Notebook {} ({} cells, identity {})",
        notebook.name,
        notebook.cells.len(),
        notebook.identity
    );

    if args.check_syntax {
        check_syntax(&notebook)?;
    }

    if args.no_exec {
        if let Some(target) = &args.export_source {
            write_target(target, &export_source(&notebook.cells))?;
        }
        if let Some(target) = &args.export_ipynb {
            export(&notebook, None, target)?;
        }
        if let Some(target) = &args.export_html {
            write_target(target, &HtmlGenerator::new().generate(&notebook, None))?;
        }
        return Ok(());
    }

    if notebook.cells.is_empty() {
        eprintln!(
            "{}No cells found in notebook.{}",
            colors::YELLOW,
            colors::RESET
        );
        return Ok(());
    }

    let report = run_cells(args, &notebook)?;

    if !args.disable_footer {
        let footer = Footer {
            notebook: notebook.name.clone(),
            started,
            duration: start.elapsed(),
            command_line: std::env::args().collect(),
        };
        notebook.add_footer(&footer);
    }

    // Outputs would interleave with a notebook written to stdout.
    let to_stdout = [&args.export_ipynb, &args.export_html]
        .iter()
        .any(|target| target.as_deref() == Some("-"));
    if !to_stdout {
        print_outputs(&report)?;
    }
    if let Some(target) = &args.export_ipynb {
        export(&notebook, Some(&report), target)?;
    }
    if let Some(target) = &args.export_html {
        write_target(target, &HtmlGenerator::new().generate(&notebook, Some(&report)))?;
    }

    eprintln!(
        "{}Completed{} {} cells in {:.2}s ({} cached, {} executed)",
        colors::GREEN,
        colors::RESET,
        report.stats.replayed + report.stats.executed,
        start.elapsed().as_secs_f64(),
        report.stats.replayed,
        report.stats.executed
    );
    if let Some(index) = report.degraded {
        eprintln!(
            "{}Caching was disabled after cell {}.{}",
            colors::YELLOW,
            index,
            colors::RESET
        );
    }

    Ok(())
}

fn load(args: &RunArgs) -> anyhow::Result<Notebook> {
    let notebook = if let Some(path) = &args.import_ipynb {
        if !args.params.is_empty() {
            bail!("--param cannot be combined with --import-ipynb");
        }
        Notebook::from_ipynb_file(path)?
    } else {
        let Some(path) = &args.notebook else {
            bail!("no notebook given");
        };
        let overrides = args
            .params
            .iter()
            .map(|arg| parse_assignment(arg))
            .collect::<Result<Vec<_>, _>>()?;
        Notebook::from_source_file(path, &overrides)?
    };
    Ok(notebook.with_tag(args.cache_tag.as_deref()))
}

fn check_syntax(notebook: &Notebook) -> anyhow::Result<()> {
    let kernel = ScriptKernel::new();
    for cell in notebook.cells.iter().filter(|c| c.is_code()) {
        kernel
            .check(&cell.content)
            .with_context(|| format!("Syntax error in cell {}", cell.index))?;
    }
    info!("Syntax check passed for {} code cells", notebook.code_cell_count());
    Ok(())
}

fn run_cells(args: &RunArgs, notebook: &Notebook) -> anyhow::Result<RunReport> {
    let mode = CacheMode::from_flags(args.disable_cache, args.ignore_cache);
    match open_store(args, mode) {
        Some(store) => {
            info!("Cache {} at {}", mode, store.dir().display());
            run_with(store, mode, notebook)
        }
        None => run_with(MemoryStore::new(), CacheMode::Disabled, notebook),
    }
}

/// The on-disk store, or `None` when the run should not use one.
fn open_store(args: &RunArgs, mode: CacheMode) -> Option<FileStore> {
    if mode == CacheMode::Disabled {
        return None;
    }
    match CacheDirs::resolve(args.cache_dir.as_deref())
        .and_then(|dirs| FileStore::open(&dirs.cache_dir))
    {
        Ok(store) => Some(store),
        Err(e) => {
            warn!("Cache directory unavailable, running with caching disabled: {}", e);
            None
        }
    }
}

fn run_with<S: SessionStore>(
    store: S,
    mode: CacheMode,
    notebook: &Notebook,
) -> anyhow::Result<RunReport> {
    let mut controller =
        ExecutionController::new(ScriptKernel::new(), store, notebook.fingerprinter(), mode);
    controller.set_callback(ProgressCallback::new(notebook.cells.len()));

    let report = controller
        .run(&notebook.cells)
        .with_context(|| format!("Failed to run {}", notebook.name))?;
    Ok(report)
}

fn print_outputs(report: &RunReport) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    for output in report.outputs().filter(|o| !o.is_empty()) {
        let text = output.to_string();
        write!(stdout, "{}", text)?;
        if !text.ends_with('\n') {
            writeln!(stdout)?;
        }
    }
    Ok(())
}

fn export(notebook: &Notebook, report: Option<&RunReport>, target: &str) -> anyhow::Result<()> {
    let jupyter = IpynbGenerator::new().generate(notebook, report);
    write_target(target, &jupyter.to_json()?)
}

/// Write to a file, or to stdout for `-`.
fn write_target(target: &str, content: &str) -> anyhow::Result<()> {
    if target == "-" {
        let mut stdout = io::stdout().lock();
        stdout.write_all(content.as_bytes())?;
        if !content.ends_with('\n') {
            writeln!(stdout)?;
        }
        return Ok(());
    }

    let path = Path::new(target);
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    eprintln!("Wrote {}", path.display());
    Ok(())
}
