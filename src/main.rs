//! authgate - issue and inspect session authenticators from the command line

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use authgate::auth::{create_service, spawn_purge_task, AuthenticatorService};
use authgate::config::Config;
use authgate::security::encryption::SecretKey;
use authgate::transport::RequestContext;
use axum::http::{header, HeaderMap, HeaderValue};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// authgate - session authenticators, stateless or store-backed
#[derive(Parser)]
#[command(name = "authgate", version, about)]
struct Cli {
    /// Config file (default: ~/.authgate/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new 32-byte secret key file
    Keygen {
        /// Where to write the key
        path: PathBuf,

        /// Overwrite an existing key
        #[arg(long)]
        force: bool,
    },

    /// Create and print a token for an identity
    Issue {
        /// Principal the token stands for
        identity: String,

        /// User agent the token is bound to
        #[arg(long, default_value = "authgate-cli")]
        user_agent: String,
    },

    /// Resolve a token and print its authenticator (no device binding check)
    Inspect { token: String },

    /// Discard a token (no device binding check)
    Revoke { token: String },

    /// Remove expired records from the store
    Purge {
        /// Keep sweeping at the configured interval instead of once
        #[arg(long)]
        watch: bool,
    },

    /// Print the config file JSON schema
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen { path, force } => keygen(&path, force),
        Commands::Schema => {
            println!("{}", Config::json_schema()?);
            Ok(())
        }
        Commands::Issue {
            identity,
            user_agent,
        } => {
            let (config, service) = load(cli.config)?;
            issue(&config, &service, &identity, &user_agent).await
        }
        Commands::Inspect { token } => {
            let (_, service) = load(cli.config)?;
            inspect(&service, &token).await
        }
        Commands::Revoke { token } => {
            let (_, service) = load(cli.config)?;
            revoke(&service, &token).await
        }
        Commands::Purge { watch } => {
            let (config, service) = load(cli.config)?;
            purge(&config, service, watch).await
        }
    }
}

fn load(path: Option<PathBuf>) -> Result<(Config, AuthenticatorService)> {
    let config = Config::load_or_default(path.as_deref())?;
    let service = create_service(&config)?;
    Ok((config, service))
}

fn keygen(path: &std::path::Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to replace it (outstanding tokens stop decoding)",
            path.display()
        );
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    SecretKey::generate_key_file(path)
        .with_context(|| format!("Failed to write key to {}", path.display()))?;
    println!("Wrote secret key to {}", path.display());
    Ok(())
}

async fn issue(
    config: &Config,
    service: &AuthenticatorService,
    identity: &str,
    user_agent: &str,
) -> Result<()> {
    if config.store.backend == "memory" {
        tracing::warn!("Memory store does not outlive this process; the token is unusable");
    }
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_str(user_agent)?);
    let request = RequestContext::new(headers);
    let authenticator = service.create(identity, &request).await?;
    let value = service.init(&authenticator).await?;
    println!("{}", value.as_str());
    Ok(())
}

async fn inspect(service: &AuthenticatorService, token: &str) -> Result<()> {
    match service.resolve_token(token).await? {
        Some(authenticator) => {
            println!("{}", serde_json::to_string_pretty(&authenticator)?);
            println!("valid: {}", service.is_valid(&authenticator));
        }
        None => println!("Token not recognised"),
    }
    Ok(())
}

async fn revoke(service: &AuthenticatorService, token: &str) -> Result<()> {
    let Some(authenticator) = service.resolve_token(token).await? else {
        anyhow::bail!("Token not recognised");
    };
    service.discard(&authenticator, &mut HeaderMap::new()).await?;
    if service.mode_name() == "stateless" {
        println!("Stateless tokens cannot be revoked; it stays valid until it expires");
    } else {
        println!("Revoked");
    }
    Ok(())
}

async fn purge(config: &Config, service: AuthenticatorService, watch: bool) -> Result<()> {
    if !watch {
        let removed = service.purge_expired().await?;
        println!("Removed {removed} expired authenticator(s)");
        return Ok(());
    }
    let every = Duration::from_secs(config.store.purge_interval_secs);
    if every.is_zero() {
        anyhow::bail!("store.purge_interval_secs is 0; sweeping is disabled");
    }
    spawn_purge_task(Arc::new(service), every).await?;
    Ok(())
}
