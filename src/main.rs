//! MQTT PostgreSQL Auth CLI
//!
//! Operator tooling for the auth engine: generate password hashes for the
//! users table and run one-off authentication or ACL checks against a live
//! store.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sentinel_agent_mqtt_pgauth::auth::{hash_password, sha256_pwd_salt};
use sentinel_agent_mqtt_pgauth::{Access, BrokerEvent, Engine, EngineConfig};
use std::io::Read;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// MQTT PostgreSQL auth engine tooling
#[derive(Parser, Debug)]
#[command(name = "mqtt-pgauth")]
#[command(author = "Sentinel Contributors")]
#[command(version)]
#[command(about = "Authentication and ACL tooling for the MQTT PostgreSQL auth engine", long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Enable JSON log format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Hash a password for the users table
    Hash {
        /// Password to hash; read from stdin when omitted
        password: Option<String>,

        /// Hash scheme
        #[arg(long, value_enum, default_value_t = Scheme::Bcrypt)]
        scheme: Scheme,

        /// bcrypt cost factor
        #[arg(long, default_value_t = 12)]
        cost: u32,

        /// Salt for the sha256-salt scheme
        #[arg(long)]
        salt: Option<String>,
    },

    /// Run a single decision against the configured store
    Check {
        /// Configuration file path (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(subcommand)]
        event: CheckEvent,
    },
}

#[derive(Subcommand, Debug)]
enum CheckEvent {
    /// Authenticate a username and password
    Auth {
        username: String,
        password: String,
        #[arg(long, default_value = "")]
        client_id: String,
    },

    /// Check topic access
    Acl {
        username: String,
        topic: String,
        #[arg(long, value_enum, default_value_t = AccessArg::Read)]
        access: AccessArg,
        #[arg(long, default_value = "")]
        client_id: String,
        /// Client address, used by address bypass hooks
        #[arg(long)]
        address: Option<IpAddr>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Scheme {
    Bcrypt,
    Sha256Salt,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AccessArg {
    Read,
    Write,
    Subscribe,
}

impl From<AccessArg> for Access {
    fn from(arg: AccessArg) -> Self {
        match arg {
            AccessArg::Read => Access::READ,
            AccessArg::Write => Access::WRITE,
            AccessArg::Subscribe => Access::SUBSCRIBE,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }

    match args.command {
        Command::Hash {
            password,
            scheme,
            cost,
            salt,
        } => {
            let password = match password {
                Some(password) => password,
                None => read_password_from_stdin()?,
            };
            if password.is_empty() {
                bail!("password must not be empty");
            }

            let hash = match (scheme, salt) {
                (Scheme::Bcrypt, _) => hash_password(&password, cost)?,
                (Scheme::Sha256Salt, Some(salt)) => sha256_pwd_salt(&password, &salt),
                (Scheme::Sha256Salt, None) => bail!("--salt is required for sha256-salt"),
            };
            println!("{}", hash);
        }
        Command::Check { config, event } => {
            let mut engine_config = match &config {
                Some(path) => {
                    info!(path = %path.display(), "Loading configuration from file");
                    EngineConfig::from_file(path)
                        .with_context(|| format!("loading {}", path.display()))?
                }
                None => EngineConfig::default(),
            };
            engine_config.apply_env()?;

            let engine = Engine::from_config(engine_config)?;
            let (decision, broker_event) = match event {
                CheckEvent::Auth {
                    username,
                    password,
                    client_id,
                } => (
                    engine.authenticate(&username, &password, &client_id).await,
                    BrokerEvent::BasicAuth,
                ),
                CheckEvent::Acl {
                    username,
                    topic,
                    access,
                    client_id,
                    address,
                } => (
                    engine
                        .authorize(&username, &client_id, address, &topic, access.into())
                        .await,
                    BrokerEvent::AclCheck,
                ),
            };
            engine.teardown().await;

            let verdict = if decision.is_allowed() { "allow" } else { "deny" };
            println!(
                "{} (code {}): {}",
                verdict,
                broker_event.status(&decision),
                decision.reason()
            );
        }
    }

    Ok(())
}

/// Read a password from stdin, dropping trailing newline characters
fn read_password_from_stdin() -> Result<String> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("reading password from stdin")?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}
