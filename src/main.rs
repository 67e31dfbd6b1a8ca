use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chorus::accounts::{self, AccountStore};
use chorus::banner::{BannerInfo, print_banner, print_run_summary};
use chorus::config::Settings;
use chorus::consts::{DEFAULT_CONFIG_PATH, default_db_path};
use chorus::engine::Engine;
use chorus::engine::chorus::ChorusEngine;

#[derive(Parser)]
#[command(name = "chorus", version, about = "Many voices, one channel.")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Settings file (channel, reactions, pacing)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// SQLite database holding registered accounts [default: ~/.chorus/chorus.db]
    #[arg(short, long)]
    db: Option<PathBuf>,

    /// Historical messages to process at startup (overrides the settings file)
    #[arg(short, long)]
    backlog_limit: Option<usize>,

    /// Go straight to live mode without touching old messages
    #[arg(long, default_value_t = false)]
    skip_backlog: bool,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,
}

#[derive(Subcommand)]
enum Command {
    /// Manage the accounts that react
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    /// Register an account (re-adding a name replaces its token)
    Add {
        name: String,
        /// Bot token; read from stdin when omitted
        #[arg(long)]
        token: Option<String>,
    },
    /// Unregister an account
    Remove { name: String },
    /// List registered accounts in dispatch order
    List,
}

fn init_tracing(level: LevelFilter) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}

fn resolve_db_path(db: Option<PathBuf>) -> anyhow::Result<String> {
    let path = match db {
        Some(path) => path,
        None => default_db_path().context("cannot determine home directory, pass --db")?,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    path.to_str()
        .map(str::to_string)
        .context("database path is not valid UTF-8")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    let db_path = resolve_db_path(cli.db.clone())?;

    if let Some(Command::Account { action }) = cli.command {
        return handle_account(&db_path, action);
    }

    let settings = Settings::load(&cli.config)
        .with_context(|| format!("failed to load settings from {}", cli.config.display()))?;
    let mut engine_config = settings.engine_config()?;
    if let Some(limit) = cli.backlog_limit {
        engine_config.backlog_limit = limit;
    }
    if cli.skip_backlog {
        engine_config.backlog_limit = 0;
    }

    let store = AccountStore::open(&db_path)?;
    let registered = store.list()?;
    if registered.is_empty() {
        bail!("no accounts registered, add one with `chorus account add <name>`");
    }

    let names: Vec<String> = registered.iter().map(|a| a.name.clone()).collect();
    print_banner(&BannerInfo {
        channel: &settings.channel.to_string(),
        reactions: engine_config.vocabulary.symbols(),
        accounts: &names,
        backlog_limit: engine_config.backlog_limit,
        db: &db_path,
    });

    let sessions = accounts::sessions(&registered, &settings.telegram);
    let engine = ChorusEngine::new(sessions, engine_config);

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("stopping");
                trigger.cancel();
            }
            Err(e) => warn!(error = %e, "cannot listen for Ctrl+C"),
        }
    });

    let summary = engine.run(shutdown).await?;
    print_run_summary(&summary);
    Ok(())
}

fn handle_account(db_path: &str, action: AccountAction) -> anyhow::Result<()> {
    match action {
        AccountAction::Add { name, token } => {
            let token = match token {
                Some(token) => token,
                None => {
                    print!("Bot token for {name}: ");
                    io::stdout().flush()?;
                    let mut token = String::new();
                    io::stdin().read_line(&mut token)?;
                    token
                }
            };
            accounts::add(db_path, &name, &token)?;
            println!("✓ Added account {name}");
        }
        AccountAction::Remove { name } => {
            if accounts::remove(db_path, &name)? {
                println!("✓ Removed account {name}");
            } else {
                println!("no account named {name}");
            }
        }
        AccountAction::List => {
            let store = AccountStore::open(db_path)?;
            let registered = store.list()?;
            if registered.is_empty() {
                println!("no accounts registered");
            }
            for (i, account) in registered.iter().enumerate() {
                let bot_id = account.token.split(':').next().unwrap_or("?");
                println!("{:>3}. {} (bot {})", i + 1, account.name, bot_id);
            }
        }
    }
    Ok(())
}
