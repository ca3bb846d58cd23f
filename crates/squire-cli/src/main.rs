use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use squire_build::WalkOptions;
use squire_core::{Config, ConfigError, TargetKind, VerificationStatus};
use squire_db::ReadinessPolicy;
use squire_engine::{Backends, EngineError, Squire};
use squire_exec::{ExecError, ProcessRunner, Tool};
use squire_verify::VerificationOutcome;

/// squire - SQL schema management for PostgreSQL
#[derive(Parser)]
#[command(name = "squire")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: nearest .squire.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the schema from the SQL directory
    Schema {
        /// Root directory for SQL files
        #[arg(long)]
        sql_dir: Option<PathBuf>,

        /// Write the schema to <sql-dir>/schema.sql
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        write: bool,

        /// Include _test.sql files
        #[arg(long)]
        include_tests: bool,

        /// Only _test.sql files
        #[arg(long)]
        tests_only: bool,
    },

    /// Start the dev database
    Up,

    /// Stop and remove the dev database and its data
    Down,

    /// Show the state of the dev database
    Status,

    /// Print the connection URI of a database
    Url {
        /// Use the production database
        #[arg(short, long)]
        production: bool,
    },

    /// Recreate the dev database from the current schema
    Reset {
        /// Also load _test.sql files
        #[arg(long)]
        include_tests: bool,
    },

    /// Deploy schema changes to an existing database
    Deploy {
        /// Deploy to the production database
        #[arg(short, long)]
        production: bool,

        /// SQL file to run instead of the diff output, for custom migrations
        #[arg(long)]
        sql_path: Option<PathBuf>,

        /// Do not ask for confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Open psql against a database
    Console {
        /// Connect to the production database
        #[arg(short, long)]
        production: bool,
    },

    /// Dump the structure of a database
    Dump {
        /// Dump the production database
        #[arg(short, long)]
        production: bool,
    },

    /// Show the SQL needed to bring a database up to the current schema
    Diff {
        /// Diff against the production database
        #[arg(short, long)]
        production: bool,

        /// Test the diff against a pg_dump clone of the target
        #[arg(long)]
        verify_dump: bool,

        /// Also write a JSON report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Run SQL unit tests in a temporary database
    Test,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(err) => {
            print_error(&err);
            std::process::exit(1);
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::discover(&cwd)?,
    };

    if let Commands::Schema { sql_dir: Some(dir), .. } = &cli.command {
        config.sql_dir = cwd.join(dir);
    }

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted, cleaning up...".yellow());
            token.cancel();
        }
    });

    let backends = Backends::live(ProcessRunner::new(cancel), ReadinessPolicy::default());
    let squire = Squire::new(config, backends).with_quiet_lifecycle(true);

    match cli.command {
        Commands::Schema {
            write,
            include_tests,
            tests_only,
            ..
        } => schema_command(&squire, walk_options(include_tests, tests_only), write),
        Commands::Up => {
            let endpoint = squire.up().await?;
            eprintln!("{} {}", "Dev database running at".green(), endpoint.conn_uri());
            Ok(0)
        }
        Commands::Down => {
            squire.down().await?;
            eprintln!("{}", "Dev database removed.".green());
            Ok(0)
        }
        Commands::Status => {
            let state = squire.status().await?;
            let name = squire.dev_spec().name;
            if state.is_running() {
                println!("{}: {}", name, state.to_string().green());
            } else {
                println!("{}: {}", name, state.to_string().yellow());
            }
            Ok(0)
        }
        Commands::Url { production } => {
            println!("{}", squire.target_url(target(production)).await?);
            Ok(0)
        }
        Commands::Reset { include_tests } => {
            squire.reset(include_tests, None).await?;
            eprintln!("{}", "Database reset.".green());
            Ok(0)
        }
        Commands::Deploy {
            production,
            sql_path,
            force,
        } => deploy_command(&squire, target(production), sql_path.as_deref(), force).await,
        Commands::Console { production } => {
            let uri = squire.target_url(target(production)).await?;
            println!("==> Connecting to: {uri}");
            std::io::stdout().flush()?;
            Ok(squire_exec::hand_over(Tool::PSQL, &[uri.as_str()])?)
        }
        Commands::Dump { production } => {
            let dump = squire.dump(target(production)).await?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(dump.as_bytes())?;
            stdout.flush()?;
            Ok(0)
        }
        Commands::Diff {
            production,
            verify_dump,
            report,
        } => diff_command(&squire, target(production), verify_dump, report.as_deref(), cli.verbose > 0).await,
        Commands::Test => {
            let table = squire.test().await?;
            if table.is_empty() {
                eprintln!("{}", "The test query returned no rows.".yellow());
            } else {
                print!("{table}");
            }
            Ok(0)
        }
        Commands::Config => {
            print!("{}", squire.config().to_toml()?);
            Ok(0)
        }
    }
}

fn schema_command(squire: &Squire, options: WalkOptions, write: bool) -> Result<i32> {
    let mut stdout = std::io::stdout().lock();
    if write {
        let path = squire.write_schema_file(options)?;
        let mut file = std::fs::File::open(&path).with_context(|| format!("failed to read {}", path.display()))?;
        std::io::copy(&mut file, &mut stdout)?;
    } else {
        squire.schema(options, &mut stdout)?;
    }
    stdout.flush()?;
    Ok(0)
}

async fn deploy_command(squire: &Squire, target: TargetKind, sql_path: Option<&Path>, force: bool) -> Result<i32> {
    let sql = match sql_path {
        Some(path) => Some(std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?),
        None => None,
    };

    let plan = squire.plan_deploy(target, sql).await?;
    if plan.is_empty() {
        eprintln!("{}", "No changes to deploy.".green());
        return Ok(0);
    }

    if target == TargetKind::Production && !force {
        println!("{}", plan.sql);
        if !confirm("Apply these changes to the production database?")? {
            eprintln!("{}", "Deploy cancelled.".yellow());
            return Ok(1);
        }
    } else if force {
        tracing::info!("force requested, not asking for confirmation");
    }

    squire.deploy(&plan).await?;
    eprintln!("{}", "Changes successfully deployed.".green());
    Ok(0)
}

async fn diff_command(
    squire: &Squire,
    target: TargetKind,
    verify_dump: bool,
    report_path: Option<&Path>,
    verbose: bool,
) -> Result<i32> {
    let options = squire_engine::DiffOptions {
        target,
        verify: verify_dump || squire.config().diff.verify,
        verbose,
    };

    let mut stdout = tokio::io::stdout();
    let report = squire.diff(options, &mut stdout).await?;
    stdout.flush().await?;

    if let Some(path) = report_path {
        report
            .save_to_file(path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        eprintln!("{} {}", "Report saved to:".green(), path.display());
    }

    match report.verification {
        VerificationStatus::Failed { diff } => {
            let outcome = VerificationOutcome::Failed { diff };
            eprintln!();
            eprintln!("{}", "✗ verification failed, schema after apply does not match".red().bold());
            if let Some(detail) = outcome.detail() {
                eprintln!("\n{detail}");
            }
            Ok(1)
        }
        VerificationStatus::Passed => {
            eprintln!("{}", "✓ Verification passed".green());
            Ok(0)
        }
        VerificationStatus::Skipped => Ok(0),
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{} [y/N] ", prompt.bold());
    std::io::stderr().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn target(production: bool) -> TargetKind {
    if production {
        TargetKind::Production
    } else {
        TargetKind::Dev
    }
}

fn walk_options(include_tests: bool, tests_only: bool) -> WalkOptions {
    WalkOptions {
        include_tests,
        tests_only,
    }
}

fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);
    if let Some(detail) = error_detail(err) {
        eprintln!("\n{}", detail);
    }
}

fn error_detail(err: &anyhow::Error) -> Option<String> {
    if let Some(e) = err.downcast_ref::<EngineError>() {
        return e.detail();
    }
    if let Some(e) = err.downcast_ref::<ConfigError>() {
        return e.detail();
    }
    if let Some(e) = err.downcast_ref::<ExecError>() {
        return e.detail();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn diff_flags() {
        let cli = Cli::try_parse_from(["squire", "-vv", "diff", "--verify-dump", "--report", "r.json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Diff {
                production,
                verify_dump,
                report,
            } => {
                assert!(!production);
                assert!(verify_dump);
                assert_eq!(report, Some(PathBuf::from("r.json")));
            }
            _ => panic!("expected diff"),
        }
    }

    #[test]
    fn schema_writes_by_default() {
        let cli = Cli::try_parse_from(["squire", "schema"]).unwrap();
        assert!(matches!(cli.command, Commands::Schema { write: true, .. }));

        let cli = Cli::try_parse_from(["squire", "schema", "--write", "false", "--tests-only"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Schema {
                write: false,
                tests_only: true,
                ..
            }
        ));
    }

    #[test]
    fn deploy_flags() {
        let cli = Cli::try_parse_from(["squire", "deploy", "-p", "-f", "--sql-path", "m.sql"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Deploy {
                production: true,
                force: true,
                sql_path: Some(_),
            }
        ));
    }

    #[test]
    fn console_flags() {
        let cli = Cli::try_parse_from(["squire", "console"]).unwrap();
        assert!(matches!(cli.command, Commands::Console { production: false }));

        let cli = Cli::try_parse_from(["squire", "console", "--production"]).unwrap();
        assert!(matches!(cli.command, Commands::Console { production: true }));
    }

    #[test]
    fn details_are_found_through_anyhow() {
        let err = anyhow::Error::from(EngineError::NotRunning { name: "shop".to_string() });
        assert!(error_detail(&err).unwrap().contains("squire up"));

        let err = anyhow::Error::from(ConfigError::MissingProductionUrl { env: "PGURI".to_string() });
        assert!(error_detail(&err).unwrap().contains("PGURI"));

        let err = anyhow::Error::from(ExecError::ToolNotFound { tool: Tool::PSQL });
        assert!(error_detail(&err).unwrap().contains("shipped with PostgreSQL"));

        assert!(error_detail(&anyhow::anyhow!("plain")).is_none());
    }
}
