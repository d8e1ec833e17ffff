//! wellknown-server - challenge publication endpoint with signed-request auth

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wellknown_auth::authn::{LruReplayCache, DEFAULT_MAX_SKEW_SECS};
use wellknown_auth::gate::{CapabilitySet, Gate};
use wellknown_auth::PublicKey;
use wellknown_server::{app, open_database, AppState, ChallengeStore, SqlRegistry};

/// Published challenges are garbage after one validation round; purge
/// anything a day old.
const PURGE_MAX_AGE_SECS: i64 = 86_400;
const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Wellknown - serve validation challenges published by signed requests
#[derive(Parser)]
#[command(name = "wellknown-server", version, about)]
struct Cli {
    /// SQLite database path
    #[arg(long, env = "WELLKNOWN_DB", default_value = "wellknown.db", global = true)]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8000")]
        bind: SocketAddr,
    },

    /// Manage accounts and their registered keys
    #[command(subcommand)]
    User(UserCommands),
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create an account
    Add {
        username: String,

        /// Mark the account trusted immediately
        #[arg(long)]
        trusted: bool,

        /// Grant create and delete up front (the grants a publishing agent needs)
        #[arg(long)]
        full_grants: bool,
    },

    /// Mark an account trusted (or untrusted with --off)
    Trust {
        username: String,

        #[arg(long)]
        off: bool,
    },

    /// Replace an account's operation grants
    Grant {
        username: String,

        #[arg(long)]
        create: bool,

        #[arg(long)]
        update: bool,

        #[arg(long)]
        delete: bool,
    },

    /// Register a public key (base64, as printed by the agent) for an account
    AddKey {
        username: String,

        /// Base64url-encoded Ed25519 public key
        key: String,
    },

    /// List accounts with their standing, grants, and key counts
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = run(cli).await;

    if let Err(e) = &result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let pool = open_database(&cli.db)
        .await
        .with_context(|| format!("could not open database {}", cli.db.display()))?;
    let registry = Arc::new(SqlRegistry::new(pool.clone()).await?);

    match cli.command {
        Commands::Serve { bind } => {
            let store = ChallengeStore::new(pool).await?;

            let replay_ttl = Duration::from_secs(2 * DEFAULT_MAX_SKEW_SECS as u64);
            let gate = Gate::new(
                DEFAULT_MAX_SKEW_SECS,
                LruReplayCache::new(replay_ttl, 100_000),
            );

            let purge_store = store.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(PURGE_INTERVAL);
                loop {
                    interval.tick().await;
                    match purge_store.purge_older_than(PURGE_MAX_AGE_SECS).await {
                        Ok(0) => {}
                        Ok(purged) => tracing::info!(purged, "purged stale challenges"),
                        Err(err) => tracing::warn!(error = %err, "challenge purge failed"),
                    }
                }
            });

            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("could not bind {bind}"))?;
            tracing::info!(%bind, db = %cli.db.display(), "listening");

            axum::serve(listener, app(AppState::new(gate, registry, store)))
                .await
                .context("server exited")?;
            Ok(())
        }

        Commands::User(command) => run_user_command(&registry, command).await,
    }
}

async fn run_user_command(registry: &SqlRegistry, command: UserCommands) -> Result<()> {
    match command {
        UserCommands::Add {
            username,
            trusted,
            full_grants,
        } => {
            let capabilities = if full_grants {
                CapabilitySet::full()
            } else {
                CapabilitySet::default()
            };
            registry.add_principal(&username, trusted, capabilities).await?;
            println!("added {username}");
        }

        UserCommands::Trust { username, off } => {
            registry.set_trusted(&username, !off).await?;
            println!("{username} is now {}", if off { "untrusted" } else { "trusted" });
        }

        UserCommands::Grant {
            username,
            create,
            update,
            delete,
        } => {
            registry
                .grant(
                    &username,
                    CapabilitySet {
                        create,
                        update,
                        delete,
                    },
                )
                .await?;
            println!("updated grants for {username}");
        }

        UserCommands::AddKey { username, key } => {
            let key = PublicKey::from_base64(&key).context("key is not a valid public key")?;
            registry.add_key(&username, &key).await?;
            println!("registered key {} for {username}", key.to_base64());
        }

        UserCommands::List => {
            for summary in registry.list().await? {
                let p = &summary.principal;
                println!(
                    "{}\ttrusted={}\tcreate={} update={} delete={}\tkeys={}",
                    p.username,
                    p.trusted,
                    p.capabilities.create,
                    p.capabilities.update,
                    p.capabilities.delete,
                    summary.key_count,
                );
            }
        }
    }

    Ok(())
}
