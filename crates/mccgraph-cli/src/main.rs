use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use mccgraph_core::{
    format_customer_id, AccessLevel, ConfigManager, CredentialContext, Credentials,
    LoggingConfig, MccGraphConfig, TraversalStrategy,
};
use mccgraph_graph::{HierarchyNode, SnapshotDirectory, TraversalConfig, TraversalEngine, TraversalResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "mccgraph")]
#[command(about = "MccGraph CLI - manager account hierarchy discovery", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (pretty, json, summary)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Config file to load instead of the discovered one
    #[arg(long, global = true, env = "MCCGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Pretty,
    Json,
    Summary,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Deep,
    Flat,
}

impl From<StrategyArg> for TraversalStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Deep => TraversalStrategy::Deep,
            StrategyArg::Flat => TraversalStrategy::Flat,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Discover the account hierarchy visible to the configured credential
    Traverse {
        /// JSON snapshot of the account directory
        #[arg(long, env = "MCCGRAPH_SNAPSHOT")]
        snapshot: PathBuf,

        /// Traversal preset
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Deepest level below an entry point to record
        #[arg(long)]
        max_depth: Option<usize>,

        /// Overall run budget in milliseconds
        #[arg(long)]
        budget_ms: Option<u64>,

        /// Directory calls in flight at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Login customer that authorizes classification of directly visible
        /// accounts (xxx-xxx-xxxx accepted)
        #[arg(long)]
        login_customer: Option<String>,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a default config file
    Init {
        /// Target path (defaults to ~/.mccgraph/config.toml)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::from_path(path),
        None => ConfigManager::load(),
    }
    .context("Failed to load configuration")?;

    init_logging(&manager.config().logging, cli.verbose);

    if let Err(e) = execute_command(&cli, &manager).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

/// Logs go to stderr so `-o json` stays machine-readable.
fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else {
        logging.level.to_ascii_lowercase()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("mccgraph={level},mccgraph_core={level},mccgraph_graph={level}").into()
    });
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format.to_ascii_lowercase().as_str() {
        "json" => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        "compact" => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init(),
        _ => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn execute_command(cli: &Cli, manager: &ConfigManager) -> Result<()> {
    match &cli.command {
        Commands::Traverse {
            snapshot,
            strategy,
            max_depth,
            budget_ms,
            concurrency,
            login_customer,
        } => {
            let mut settings = manager.config().traversal.clone();
            if let Some(strategy) = strategy {
                settings.strategy = (*strategy).into();
                // a preset switch brings its own depth unless one is given
                settings.max_depth = None;
            }
            if let Some(depth) = max_depth {
                settings.max_depth = Some(*depth);
            }
            if let Some(budget) = budget_ms {
                settings.run_budget_ms = *budget;
            }
            if let Some(concurrency) = concurrency {
                settings.max_concurrency = *concurrency;
            }

            let credential = initial_credential(manager.config(), login_customer.as_deref())?;
            let directory = SnapshotDirectory::from_path(snapshot)
                .with_context(|| format!("Failed to load snapshot {}", snapshot.display()))?;

            let engine =
                TraversalEngine::with_config(Arc::new(directory), TraversalConfig::from_settings(&settings));
            let result = engine
                .traverse(&credential)
                .await
                .context("Traversal failed")?;

            print_result(cli.output, &result)
        }
        Commands::Config(ConfigCommands::Init { path, force }) => {
            let path = match path {
                Some(path) => path.clone(),
                None => ConfigManager::user_config_path()
                    .context("Could not determine home directory, pass a path")?,
            };
            init_config(&path, *force)?;
            println!("{} {}", "Wrote".green().bold(), path.display());
            Ok(())
        }
        Commands::Config(ConfigCommands::Show) => {
            let value = effective_config(manager);
            match cli.output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&value)?),
                _ => print_pretty(&value, 0),
            }
            Ok(())
        }
    }
}

fn initial_credential(config: &MccGraphConfig, login_customer: Option<&str>) -> Result<CredentialContext> {
    let mut credentials = config.credentials.clone();
    if let Some(login) = login_customer {
        credentials.login_customer_id = Some(login.to_string());
    }

    if credentials.is_complete() {
        return Ok(credentials.to_context()?);
    }

    // Snapshots never check secrets, so an offline run may go without them.
    warn!("Credentials incomplete, running against the snapshot with an offline identity");
    let offline = Credentials::new("offline", "offline", "offline", "offline")?;
    Ok(match credentials.login_customer_id.as_deref() {
        Some(login) => CredentialContext::with_login_customer(offline, login)?,
        None => CredentialContext::new(offline),
    })
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    ConfigManager::create_default_config(path)?;
    info!(path = %path.display(), "Created default configuration");
    Ok(())
}

fn effective_config(manager: &ConfigManager) -> serde_json::Value {
    let config = manager.config();
    let secret = |present: bool| if present { "[redacted]" } else { "[not set]" };
    serde_json::json!({
        "config_file": manager
            .config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(defaults)".to_string()),
        "traversal": {
            "strategy": config.traversal.strategy.to_string(),
            "max_depth": config.traversal.effective_max_depth(),
            "run_budget_ms": config.traversal.run_budget_ms,
            "call_timeout_ms": config.traversal.call_timeout_ms,
            "max_concurrency": config.traversal.max_concurrency,
        },
        "credentials": {
            "client_id": config.credentials.client_id.clone().unwrap_or_else(|| "[not set]".to_string()),
            "client_secret": secret(config.credentials.client_secret.is_some()),
            "refresh_token": secret(config.credentials.refresh_token.is_some()),
            "developer_token": secret(config.credentials.developer_token.is_some()),
            "login_customer_id": config.credentials.login_customer_id.as_deref().map(format_customer_id),
        },
        "logging": {
            "level": config.logging.level,
            "format": config.logging.format,
        },
    })
}

fn print_result(format: OutputFormat, result: &TraversalResult) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Summary => println!("{}", result.summary()),
        OutputFormat::Pretty => {
            if result.forest.is_empty() {
                println!("{}", "No accounts discovered".yellow());
            }
            for root in &result.forest {
                print_node(root, 0);
            }
            if !result.failures.is_empty() {
                println!("\n{}", "Inaccessible:".yellow().bold());
                for failure in &result.failures {
                    println!(
                        "  {} ({}): {}",
                        format_customer_id(&failure.account_id),
                        failure.kind,
                        failure.message
                    );
                }
            }
            if result.cancelled {
                println!(
                    "\n{}",
                    "Run budget exhausted, hierarchy is partial".yellow()
                );
            }
            println!("\n{}", result.summary().cyan());
        }
    }
    Ok(())
}

fn print_node(node: &HierarchyNode, depth: usize) {
    let account = &node.account;
    let marker = if account.is_manager {
        "[MCC]".cyan().bold()
    } else {
        "[client]".normal()
    };
    let access = match account.access_level {
        AccessLevel::DirectAccess => account.access_level.to_string().green(),
        AccessLevel::ViaManager => account.access_level.to_string().blue(),
        AccessLevel::Unknown => account.access_level.to_string().red(),
    };
    let locale = [account.currency_code.as_str(), account.time_zone.as_str()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    print!(
        "{}{} {} {}",
        "  ".repeat(depth),
        marker,
        format_customer_id(&account.id).yellow(),
        account.display_name.bold()
    );
    if !locale.is_empty() {
        print!(" ({locale})");
    }
    println!(" - {}", access);

    for child in &node.children {
        print_node(child, depth + 1);
    }
}

fn print_pretty(value: &serde_json::Value, indent: usize) {
    let pad = "  ".repeat(indent);
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                let key_colored = key.cyan().bold();
                match val {
                    serde_json::Value::Object(_) => {
                        println!("{pad}{}:", key_colored);
                        print_pretty(val, indent + 1);
                    }
                    serde_json::Value::String(s) => println!("{pad}{}: {}", key_colored, s.green()),
                    serde_json::Value::Number(n) => {
                        println!("{pad}{}: {}", key_colored, n.to_string().yellow())
                    }
                    serde_json::Value::Null => println!("{pad}{}: {}", key_colored, "-".dimmed()),
                    _ => println!("{pad}{}: {}", key_colored, val),
                }
            }
        }
        _ => println!("{pad}{}", value),
    }
}
