//! CLI entry point for msgraph, a typed Microsoft Graph client.
//!
//! Loads configuration (file, then `GRAPH_*` environment, then flags),
//! authenticates via OAuth2 client credentials, runs one subcommand, and
//! prints the decoded result as pretty JSON on stdout.
//!
//! Exit codes:
//! - 0: success
//! - 1: runtime error (configuration, auth failure, API error, decode error)
//! - 2: argument validation error (clap handles this automatically)

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

use msgraph_typed::authentication_methods::list_authentication_methods;
use msgraph_typed::client::GraphClient;
use msgraph_typed::config::GraphConfig;
use msgraph_typed::configuration_policies::{
    get_configuration_policy, list_configuration_policy_settings,
};
use msgraph_typed::error::Result;
use msgraph_typed::named_locations::list_named_locations;
use msgraph_typed::odata::Query;

#[derive(Parser)]
#[command(name = "msgraph", version, about, long_about = None)]
struct Cli {
    /// TOML configuration file. Environment and flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Entra ID tenant ID.
    #[arg(long, global = true)]
    tenant_id: Option<String>,

    /// Application (client) ID.
    #[arg(long, global = true)]
    client_id: Option<String>,

    /// Client secret. Prefer GRAPH_CLIENT_SECRET so the secret stays out of
    /// process listings and shell history.
    #[arg(long, global = true, env = "GRAPH_CLIENT_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Graph base URL, for national clouds.
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a user's authentication methods.
    AuthMethods {
        /// User object ID or UPN.
        #[arg(long)]
        user: String,
    },
    /// List Conditional Access named locations.
    NamedLocations {
        /// Return at most this many locations and stop paging.
        #[arg(long)]
        top: Option<u32>,
    },
    /// Show a settings catalog policy with its settings.
    ConfigPolicy {
        /// Policy ID.
        #[arg(long)]
        id: String,
    },
}

impl Cli {
    fn graph_config(&self) -> Result<GraphConfig> {
        let base = match &self.config {
            Some(path) => GraphConfig::load(path)?,
            None => GraphConfig::default(),
        };
        let mut config = base.with_env();
        if let Some(v) = &self.tenant_id {
            config.tenant_id = v.clone();
        }
        if let Some(v) = &self.client_id {
            config.client_id = v.clone();
        }
        if let Some(v) = &self.secret {
            config.client_secret = Some(v.clone());
        }
        if let Some(v) = &self.endpoint {
            config.endpoint = v.clone();
        }
        Ok(config)
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.graph_config()?;
    tracing::debug!(?config, "configuration loaded");
    let client = GraphClient::from_config(&config)?;

    match &cli.command {
        Command::AuthMethods { user } => {
            let (methods, _) = list_authentication_methods(&client, user, &Query::default()).await?;
            print_json(&methods)
        }
        Command::NamedLocations { top } => {
            let query = Query {
                top: *top,
                ..Query::default()
            };
            let (locations, _) = list_named_locations(&client, &query).await?;
            print_json(&locations)
        }
        Command::ConfigPolicy { id } => {
            let (mut policy, _) = get_configuration_policy(&client, id, &Query::default()).await?;
            let (settings, _) = list_configuration_policy_settings(&client, id).await?;
            policy.settings = settings;
            print_json(&policy)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
