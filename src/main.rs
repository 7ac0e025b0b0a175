mod picker;

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use workstate::config::WorkstateConfig;
use workstate::engine::{self, format_bytes, ProgressTx, DATE_PATTERN};
use workstate::logging::{self, LogLevel};
use workstate::models::RestoreReport;
use workstate::restore::plan_restore;
use workstate::store::LocalStore;
use workstate::templates::CodeTool;

#[derive(Parser)]
#[command(name = "workstate", version, about = "Snapshot a development workspace and restore it anywhere")]
struct Cli {
    /// Project root (defaults to the current directory).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Config file (defaults to ~/.workstate/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output; repeat for more detail.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create .workstateignore from a tool template.
    Init {
        #[arg(long, short, default_value = "default", value_parser = parse_tool)]
        tool: CodeTool,
    },
    /// Show which files a save would include.
    Status {
        /// Also list excluded files and pruned directories.
        #[arg(long)]
        all: bool,
    },
    /// Package the project and store it as <name>.zip.
    Save { name: String },
    /// List saved states.
    List,
    /// Fetch a saved state and restore it.
    Download {
        name: Option<String>,
        /// Restore into this directory instead of the project root.
        #[arg(long)]
        target: Option<PathBuf>,
    },
    /// Delete a saved state.
    Delete { name: Option<String> },
    /// Create a time-limited link to a saved state.
    Share {
        name: Option<String>,
        #[arg(long)]
        hours: Option<u64>,
    },
    /// Restore a local archive file.
    Restore {
        archive: PathBuf,
        #[arg(long)]
        target: Option<PathBuf>,
        /// Only show where each entry would be written.
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the active configuration.
    Config,
}

fn parse_tool(s: &str) -> Result<CodeTool, String> {
    s.parse()
}

/// Run `job` on a worker thread and print its progress until it finishes.
fn with_progress<T, F>(job: F) -> T
where
    T: Send,
    F: FnOnce(ProgressTx) -> T + Send,
{
    let (tx, rx) = mpsc::channel::<(f32, String)>();
    thread::scope(|s| {
        let handle = s.spawn(move || job(tx));
        for (pct, msg) in rx {
            eprintln!("[{pct:>3.0}%] {msg}");
        }
        handle
            .join()
            .unwrap_or_else(|e| std::panic::resume_unwind(e))
    })
}

fn print_report(report: &RestoreReport) {
    for entry in report.renamed() {
        println!(
            "  {} -> {} (already existed)",
            entry.entry,
            entry.target.display()
        );
    }
    for failure in &report.failures {
        eprintln!("  ✗ {failure}");
    }
}

fn choose(store: &LocalStore, name: Option<String>, title: &str) -> anyhow::Result<Option<String>> {
    if name.is_some() {
        return Ok(name);
    }
    let objects = engine::list(store)?;
    if objects.is_empty() {
        println!("No saved states found.");
        return Ok(None);
    }
    let items = engine::candidates(&objects);
    Ok(picker::pick(title, &items)?)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(LogLevel::from_verbosity(cli.verbose));

    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    let config_path = match cli.config {
        Some(path) => path,
        None => WorkstateConfig::default_path()?,
    };
    let config = WorkstateConfig::load(&config_path)?;
    let open_store = || -> anyhow::Result<LocalStore> { Ok(LocalStore::open(config.store_dir()?)?) };

    match cli.command {
        Command::Init { tool } => {
            if engine::init(&root, tool)? {
                println!("✔ Created .workstateignore from the `{tool}` template.");
            } else {
                println!(".workstateignore already exists; left untouched.");
            }
        }

        Command::Status { all } => {
            let selection = engine::status(&root)?;
            if selection.included_count() == 0 {
                println!("✔ No files found.");
            }
            for entry in selection.included() {
                println!("  {:<60} {:>10}", entry.rel_path, format_bytes(entry.size));
            }
            if all {
                for entry in selection.excluded() {
                    println!("- {:<60} {:>10}", entry.rel_path, format_bytes(entry.size));
                }
                for dir in &selection.pruned_dirs {
                    println!("- {dir}/");
                }
            }
            for warning in &selection.warnings {
                eprintln!("  ! {warning}");
            }
            println!(
                "Total: {} files ({})",
                selection.included_count(),
                format_bytes(selection.total_size())
            );
        }

        Command::Save { name } => {
            let store = open_store()?;
            let summary = with_progress(|tx| engine::save(&root, &name, &store, &config.archive, tx))?;
            println!(
                "✔ State '{name}' saved as '{}': {} files, {} -> {} (sha256 {})",
                summary.object,
                summary.files,
                format_bytes(summary.original_bytes),
                format_bytes(summary.archive_bytes),
                summary.sha256
            );
            if summary.warnings > 0 {
                eprintln!("  {} paths were skipped; run `status` for details.", summary.warnings);
            }
        }

        Command::List => {
            let store = open_store()?;
            let objects = engine::list(&store)?;
            if objects.is_empty() {
                println!("No saved states found.");
            }
            for obj in objects {
                println!(
                    "{:<40} {:>10}  {}",
                    obj.name,
                    format_bytes(obj.size),
                    obj.modified.with_timezone(&chrono::Local).format(DATE_PATTERN)
                );
            }
        }

        Command::Download { name, target } => {
            let store = open_store()?;
            let Some(name) = choose(&store, name, "Select a state to download")? else {
                return Ok(());
            };
            let target = target.unwrap_or_else(|| root.clone());
            let report = with_progress(|tx| engine::download(&store, &name, &target, tx))?;
            print_report(&report);
            if !report.is_complete() {
                bail!("{} entries could not be restored", report.failures.len());
            }
        }

        Command::Delete { name } => {
            let store = open_store()?;
            let Some(name) = choose(&store, name, "Select a state to delete")? else {
                return Ok(());
            };
            engine::delete(&store, &name)?;
            println!("✔ Deleted '{name}'.");
        }

        Command::Share { name, hours } => {
            let store = open_store()?;
            let Some(name) = choose(&store, name, "Select a state to share")? else {
                return Ok(());
            };
            let link = engine::share(&store, &name, hours.unwrap_or(config.share_hours))?;
            println!("{}", link.url);
            println!(
                "Expires {} ({})",
                link.expires_at.format(DATE_PATTERN),
                link.object
            );
        }

        Command::Restore {
            archive,
            target,
            dry_run,
        } => {
            let target = target.unwrap_or_else(|| root.clone());
            if dry_run {
                print_plan(&archive, &target)?;
                return Ok(());
            }
            let report = with_progress(|tx| engine::restore_local(&archive, &target, tx))?;
            print_report(&report);
            if !report.is_complete() {
                bail!("{} entries could not be restored", report.failures.len());
            }
        }

        Command::Config => {
            println!("config file:  {}", config_path.display());
            println!("store dir:    {}", config.store_dir()?.display());
            println!("compression:  {:?}", config.archive.compression);
            println!("share hours:  {}", config.share_hours);
        }
    }

    Ok(())
}

fn print_plan(archive: &Path, target: &Path) -> anyhow::Result<()> {
    let plan = plan_restore(archive, target)?;
    for entry in &plan.entries {
        if entry.is_dir {
            continue;
        }
        let marker = match entry.resolution {
            workstate::models::ConflictResolution::WriteDirect => " ",
            workstate::models::ConflictResolution::Renamed(_) => "~",
        };
        println!("{marker} {} -> {}", entry.entry, entry.target.display());
    }
    for name in &plan.rejected {
        eprintln!("✗ {name} (unsafe name, will be skipped)");
    }
    Ok(())
}
