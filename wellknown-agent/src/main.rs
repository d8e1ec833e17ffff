//! wellknown-agent - publish and retract validation challenges over signed HTTP

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wellknown_agent::{
    Authenticator, KeyStore, PendingChallenge, ProtocolClient, Session,
};

/// Wellknown - signed challenge publication for certificate issuance
#[derive(Parser)]
#[command(name = "wellknown-agent", version, about)]
struct Cli {
    /// Account name to sign requests as
    #[arg(long, env = "WELLKNOWN_USERNAME", global = true, default_value = "")]
    username: String,

    /// Directory holding per-domain private keys (defaults to the user data dir)
    #[arg(long, global = true)]
    key_directory: Option<PathBuf>,

    /// Consent up front to disclosing this machine's public IP to the server
    #[arg(long, global = true)]
    public_ip_logging_ok: bool,

    /// Never prompt; missing input becomes a fatal error
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a challenge/response pair on a domain
    Publish {
        /// Domain to publish on
        domain: String,

        /// Challenge token
        challenge: String,

        /// Key authorization the validator expects
        response: String,
    },

    /// Retract a previously published challenge (best-effort)
    Retract {
        /// Domain the challenge was published on
        domain: String,

        /// Challenge token
        challenge: String,
    },

    /// Print the public key registered for a domain, generating one if absent
    ShowKey {
        /// Domain the key belongs to
        domain: String,
    },

    /// Verify the key directory is usable
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
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
    let keystore = KeyStore::open(resolve_key_directory(&cli)?);

    match &cli.command {
        Commands::Check => {
            keystore.validate_directory()?;
            println!("key directory {} is usable", keystore.dir().display());
            Ok(())
        }

        Commands::ShowKey { domain } => {
            let loaded = keystore.load_or_create(domain, cli.non_interactive)?;
            if loaded.newly_generated {
                eprintln!("generated a new key for {domain}");
            }
            println!("{}", loaded.key.public_key().to_base64());
            Ok(())
        }

        Commands::Publish {
            domain,
            challenge,
            response,
        } => {
            let mut authenticator = build_authenticator(&cli, keystore)?;
            authenticator.prepare()?;
            authenticator
                .perform(&[PendingChallenge {
                    domain: domain.clone(),
                    challenge: challenge.clone(),
                    response: response.clone(),
                }])
                .await?;
            Ok(())
        }

        Commands::Retract { domain, challenge } => {
            let mut authenticator = build_authenticator(&cli, keystore)?;
            authenticator
                .cleanup(&[PendingChallenge {
                    domain: domain.clone(),
                    challenge: challenge.clone(),
                    response: String::new(),
                }])
                .await;
            Ok(())
        }
    }
}

fn build_authenticator(cli: &Cli, keystore: KeyStore) -> Result<Authenticator> {
    let session = Session::new(
        cli.username.clone(),
        cli.public_ip_logging_ok,
        cli.non_interactive,
        Box::new(stdin_prompt),
    )?;
    let client = ProtocolClient::new(keystore, cli.non_interactive)?;
    Ok(Authenticator::new(client, session))
}

/// Resolve the key directory, creating the platform default when no flag
/// overrides it. An explicitly given directory is never created implicitly.
fn resolve_key_directory(cli: &Cli) -> Result<PathBuf> {
    if let Some(dir) = &cli.key_directory {
        return Ok(dir.clone());
    }

    let dirs = directories::ProjectDirs::from("org", "wellknown", "wellknown")
        .context("could not determine a platform key directory; pass --key-directory")?;
    let dir = dirs.data_dir().join("keys");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("could not create key directory {}", dir.display()))?;
    Ok(dir)
}

/// Yes/no prompt on the controlling terminal; anything but a leading `y`
/// counts as no.
fn stdin_prompt(question: &str) -> io::Result<bool> {
    eprint!("{question} [y/N] ");
    io::stderr().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(answer.trim_start().to_ascii_lowercase().starts_with('y'))
}
