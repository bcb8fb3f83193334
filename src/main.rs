//! taskboard - self-hosted task list service
//!
//! Stores one task collection per API token owner and serves it over HTTP
//! with display ordering, status filters and completion statistics.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use taskboard::api;
use taskboard::config::{self, Config};
use taskboard::db::{Database, MemoryGateway, PersistenceGateway};
use taskboard::models::StatusFilter;
use taskboard::store::TaskStore;

#[derive(Parser)]
#[command(name = "taskboard")]
#[command(about = "Self-hosted task list service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,

        /// Keep tasks in memory only; nothing survives a restart
        #[arg(long)]
        in_memory: bool,
    },

    /// Generate a new API token
    Token {
        /// Owner name for the token
        #[arg(short, long)]
        name: Option<String>,

        /// List all configured tokens
        #[arg(long)]
        list: bool,

        /// Revoke a token by name
        #[arg(long)]
        revoke: Option<String>,

        /// Config file path (for list/revoke operations)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Initialize a new config file
    Init {
        /// Output path for config file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print one owner's tasks in display order
    List {
        /// Token owner whose collection to print (omit to list owners)
        owner: Option<String>,

        /// all, active or completed
        #[arg(short, long, default_value = "all")]
        status: StatusFilter,

        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("taskboard=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            port,
            bind,
            in_memory,
        } => {
            let mut cfg = load_config(config)?;

            // Override with CLI args
            if let Some(p) = port {
                cfg.server.port = p;
            }
            if let Some(b) = bind {
                cfg.server.bind = b;
            }

            // Pick storage backend
            let gateway: Arc<dyn PersistenceGateway> = if in_memory {
                tracing::warn!("Using in-memory storage; tasks are lost on shutdown");
                Arc::new(MemoryGateway::new())
            } else {
                Arc::new(Database::open(&cfg.database.path).context("Failed to open database")?)
            };

            run_server(cfg, gateway).await
        }

        Commands::Token {
            name,
            list,
            revoke,
            config,
        } => {
            let config_path = match config {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if list {
                list_tokens(&config_path)
            } else if let Some(owner) = revoke {
                revoke_token(&config_path, &owner)
            } else {
                issue_token(&config_path, name.as_deref().unwrap_or("default"))
            }
        }

        Commands::Init { output } => {
            let path = output.unwrap_or_else(|| PathBuf::from("config.toml"));
            let cfg = Config::default();
            cfg.save_to(&path)?;

            println!("Created config file: {}", path.display());
            println!();
            println!("Next steps:");
            println!("  1. Generate a token: taskboard token --name <owner>");
            println!(
                "  2. Start the server: taskboard serve --config {}",
                path.display()
            );

            Ok(())
        }

        Commands::List {
            owner,
            status,
            config,
        } => {
            let cfg = load_config(config)?;
            let db = Database::open(&cfg.database.path).context("Failed to open database")?;

            // No owner given: list the stored collection keys
            let Some(owner) = owner else {
                println!("Stored collections:");
                for key in db.keys()? {
                    println!("  {}", key);
                }
                return Ok(());
            };

            let store = TaskStore::new(Arc::new(db), cfg.storage.prefix);
            print_tasks(&store, &owner, status)
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(&path),
        None => Config::load(),
    }
}

async fn run_server(config: Config, gateway: Arc<dyn PersistenceGateway>) -> Result<()> {
    if config.tokens.is_empty() {
        tracing::warn!("No tokens configured; every API request will be rejected");
    }

    let store = TaskStore::new(gateway, config.storage.prefix.clone());
    let state = api::AppState::new(store, config.clone());
    let app = api::create_router(state);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("taskboard listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Print every owner with a token, without revealing the tokens
fn list_tokens(config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        println!("No config at {}; create one with 'taskboard init'.", config_path.display());
        return Ok(());
    }

    let cfg = Config::load_from(config_path)?;
    if cfg.tokens.is_empty() {
        println!("No owners have tokens yet. Issue one with: taskboard token --name <owner>");
        return Ok(());
    }

    println!("Token owners:");
    for token in &cfg.tokens {
        let kind = if token.token_hash.starts_with("$argon2") {
            "hashed"
        } else {
            "plain text"
        };
        println!("  {:<20} {}", token.name, kind);
    }
    Ok(())
}

fn revoke_token(config_path: &Path, owner: &str) -> Result<()> {
    let mut cfg = Config::load_from(config_path)?;
    if cfg.revoke_token(owner) {
        cfg.save_to(config_path)?;
        tracing::info!(owner, "Token revoked");
        println!("Revoked the token for '{}'. Their tasks stay stored.", owner);
    } else {
        println!("'{}' has no token.", owner);
    }
    Ok(())
}

/// Generate a token for `owner`, storing only its hash
fn issue_token(config_path: &Path, owner: &str) -> Result<()> {
    let token = generate_token();
    let token_hash = config::hash_token(&token)?;

    if config_path.exists() {
        let mut cfg = Config::load_from(config_path)?;
        if !cfg.add_token(owner, token_hash) {
            println!("'{}' already has a token; revoke it first with --revoke.", owner);
            return Ok(());
        }
        cfg.save_to(config_path)?;
        tracing::info!(owner, "Token issued");
        println!("Token for '{}': {}", owner, token);
    } else {
        // No config to write into; print a snippet for the server's config
        println!("Token for '{}': {}", owner, token);
        println!();
        println!("Append to the server's config.toml:");
        println!("  [[tokens]]");
        println!("  name = \"{}\"", owner);
        println!("  token_hash = \"{}\"", token_hash);
    }
    println!();
    println!("Clients send it as 'Authorization: Bearer <token>'. It is shown only once.");
    Ok(())
}

fn print_tasks(store: &TaskStore, owner: &str, status: StatusFilter) -> Result<()> {
    let tasks = store.list(owner, status, true)?;

    println!("ID     | Pri    | Done | Due              | Title");
    println!("-------+--------+------+------------------+----------------");
    for task in &tasks {
        let due = match (&task.due_date, &task.due_time) {
            (Some(date), Some(time)) => format!("{} {}", date, time),
            (Some(date), None) => date.to_string(),
            (None, Some(time)) => time.to_string(),
            (None, None) => "-".to_string(),
        };
        println!(
            "{:<6} | {:<6} | {:<4} | {:<16} | {}",
            task.id,
            task.priority.as_str(),
            if task.completed { "x" } else { " " },
            due,
            task.title
        );
    }

    let stats = store.statistics(owner)?;
    println!();
    println!(
        "{} total, {} completed, {} pending ({}% done)",
        stats.total_tasks, stats.completed_tasks, stats.pending_tasks, stats.completion_rate
    );

    Ok(())
}

fn generate_token() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

    let token_body: String = bytes
        .iter()
        .map(|b| ALPHABET[(*b as usize) % ALPHABET.len()] as char)
        .collect();

    format!("tbk_{}", token_body)
}
