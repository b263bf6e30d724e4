// logfacts - main.rs
//
// Command-line entry point. Handles:
// 1. CLI argument parsing
// 2. config.toml loading and logging initialisation (debug mode support)
// 3. Log type loading (built-in + user-defined)
// 4. Dispatch to the engine

use clap::{Parser, Subcommand};
use logfacts::app::catalog::LogTypeCatalog;
use logfacts::app::engine::{Engine, EngineConfig};
use logfacts::core::model::{ClaimPolicy, LogFileSummary};
use logfacts::platform::config::{load_config, PlatformPaths};
use logfacts::platform::sqlite::SqliteFactStore;
use logfacts::util::constants;
use logfacts::util::error::LogFactsError;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// logfacts - extract typed facts from log files into a SQLite database.
#[derive(Parser, Debug)]
#[command(name = "logfacts", version, about)]
struct Cli {
    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    /// Directory holding config.toml (defaults to the platform config dir).
    #[arg(long = "config-dir", global = true)]
    config_dir: Option<PathBuf>,

    /// Directory containing user-defined log type TOML files.
    #[arg(short = 't', long = "log-types", global = true)]
    log_types: Option<PathBuf>,

    /// Fact database file.
    #[arg(long = "db", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the available log types.
    Types,

    /// Discover and parse the files of a project location.
    Parse {
        log_type: String,
        location: PathBuf,

        /// Partition workers per file.
        #[arg(short = 'w', long)]
        workers: Option<usize>,

        /// Maximum number of files registered for the project.
        #[arg(long = "max-files")]
        max_files: Option<usize>,

        /// Claim policy: exclusive, fall-through or all.
        #[arg(long)]
        policy: Option<ClaimPolicy>,

        /// Queue fact writes and commit them in batches.
        #[arg(long)]
        batch: bool,

        /// Print per-file results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the parse state of a project's files.
    Files {
        log_type: String,
        location: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Delete a project with all of its facts.
    Delete { log_type: String, location: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let paths = cli
        .config_dir
        .as_deref()
        .map_or_else(PlatformPaths::resolve, PlatformPaths::rooted_at);
    let (config, config_warnings) = load_config(&paths.config_dir);

    logfacts::util::logging::init(cli.debug, config.log_level.as_deref());

    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        "logfacts starting"
    );
    for warning in &config_warnings {
        tracing::warn!("{warning}");
    }

    match run(cli, &paths, config) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(
    cli: Cli,
    paths: &PlatformPaths,
    config: logfacts::platform::config::AppConfig,
) -> Result<ExitCode, LogFactsError> {
    // Log type directory: CLI override > config.toml > platform default
    let user_dir = cli
        .log_types
        .clone()
        .or_else(|| config.user_log_types_dir.clone())
        .unwrap_or_else(|| paths.user_log_types_dir.clone());

    let (catalog, catalog_errors) = LogTypeCatalog::load(Some(&user_dir));
    for err in &catalog_errors {
        tracing::warn!(error = %err, "Log type loading warning");
    }

    if let Command::Types = cli.command {
        print_types(&catalog);
        return Ok(ExitCode::SUCCESS);
    }

    let mut engine_config = EngineConfig::from_app_config(&config);
    if let Command::Parse {
        workers,
        max_files,
        policy,
        batch,
        ..
    } = &cli.command
    {
        if let Some(w) = workers {
            engine_config.parse.workers = (*w).clamp(1, constants::ABSOLUTE_MAX_WORKERS);
        }
        if let Some(m) = max_files {
            engine_config.discovery.max_files = (*m).clamp(1, constants::ABSOLUTE_MAX_FILES);
        }
        if let Some(p) = policy {
            engine_config.parse.claim_policy = *p;
        }
        engine_config.batch_writes |= *batch;
    }

    let db_path = cli
        .db
        .clone()
        .or_else(|| config.database.clone())
        .unwrap_or_else(|| paths.default_database());
    ensure_parent_dir(&db_path)?;
    let store = Arc::new(SqliteFactStore::open(&db_path)?);
    let engine = Engine::new(engine_config, catalog, store)?;

    match cli.command {
        Command::Types => Ok(ExitCode::SUCCESS),
        Command::Parse {
            log_type,
            location,
            json,
            ..
        } => {
            let project = engine.open_project(&log_type, &location)?;
            let report = engine.parse_project(&project)?;

            for warning in &report.sync.warnings {
                tracing::warn!("{warning}");
            }

            if json {
                let summaries: Vec<serde_json::Value> = report
                    .files
                    .iter()
                    .map(|f| match &f.result {
                        Ok(summary) => serde_json::json!({ "ok": summary }),
                        Err(e) => serde_json::json!({
                            "path": f.path,
                            "error": e.to_string(),
                        }),
                    })
                    .collect();
                print_json(&summaries);
            } else {
                for outcome in &report.files {
                    match &outcome.result {
                        Ok(s) => println!(
                            "{}  facts={} errors={} {}ms",
                            s.path.display(),
                            s.facts,
                            s.errors,
                            s.duration_ms
                        ),
                        Err(e) => println!("{}  FAILED: {e}", outcome.path.display()),
                    }
                }
                println!(
                    "{} file(s), {} fact(s), {} error(s), {} failed",
                    report.files.len(),
                    report.total_facts(),
                    report.total_errors(),
                    report.failed()
                );
            }

            Ok(if report.failed() > 0 {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::Files {
            log_type,
            location,
            json,
        } => {
            let Some(project) = engine.find_project(&log_type, &location)? else {
                println!("No project for '{log_type}' at '{}'", location.display());
                return Ok(ExitCode::SUCCESS);
            };
            let summaries: Vec<LogFileSummary> =
                project.files().iter().map(|f| f.summary()).collect();
            if json {
                print_json(&summaries);
            } else {
                for s in &summaries {
                    let parsed = s
                        .parsed
                        .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
                    println!(
                        "{:>5}  {}  size={} parsed={} facts={} errors={}{}",
                        s.id,
                        s.path.display(),
                        s.size,
                        parsed,
                        s.facts,
                        s.errors,
                        s.last_error
                            .as_deref()
                            .map(|e| format!("  last_error={e}"))
                            .unwrap_or_default()
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Delete { log_type, location } => {
            match engine.find_project(&log_type, &location)? {
                Some(project) => {
                    engine.delete_project(&project)?;
                    println!("Deleted project {}", project.id);
                }
                None => println!("No project for '{log_type}' at '{}'", location.display()),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_types(catalog: &LogTypeCatalog) {
    for lt in catalog.iter() {
        println!(
            "{:<20} {:<10} {:<24} {} pattern(s){}  {}",
            lt.name,
            format!("{:?}", lt.scope).to_lowercase(),
            lt.timestamp_format.to_string(),
            lt.patterns.len(),
            if lt.is_builtin { "" } else { " (user)" },
            lt.description
        );
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => tracing::error!(error = %e, "JSON serialisation failed"),
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), LogFactsError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            std::fs::create_dir_all(dir).map_err(|source| LogFactsError::Io {
                path: dir.to_path_buf(),
                operation: "create database directory",
                source,
            })
        }
        _ => Ok(()),
    }
}
