//! Labeler - labels cloud resources on creation and on a schedule.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use labeler::config::{LabelerConfig, DEFAULT_TOPIC};
use labeler::dispatcher::Dispatcher;
use labeler::server::{run_server, AppState};
use labeler_cloud::gcp::{GcpAuth, GcpClient, PubSub, ResourceManager};

/// Labeler - label cloud resources with their own attributes.
#[derive(Parser)]
#[command(name = "labeler")]
#[command(about = "Label cloud resources on creation and on a schedule")]
struct Cli {
    /// Listen address (or set `LABELER_LISTEN`; falls back to `0.0.0.0:$PORT`).
    #[arg(long, env = "LABELER_LISTEN")]
    listen: Option<String>,

    /// Labeling policy file (YAML).
    #[arg(long, env = "LABELER_CONFIG")]
    config: Option<PathBuf>,

    /// Project owning the reconciliation topic.
    #[arg(long, env = "LABELER_HOST_PROJECT")]
    host_project: String,

    /// Topic carrying reconciliation requests.
    #[arg(long, env = "LABELER_TOPIC", default_value = DEFAULT_TOPIC)]
    topic: String,

    /// Shared secret expected as `?token=` on push deliveries.
    #[arg(long, env = "PUBSUB_VERIFICATION_TOKEN", hide_env_values = true)]
    pubsub_token: Option<String>,

    /// Static access token. Without it the metadata server is used.
    #[arg(long, env = "GCP_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Emit logs as JSON.
    #[arg(long, env = "LABELER_LOG_JSON", default_value = "false")]
    log_json: bool,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

impl Cli {
    fn listen_addr(&self) -> String {
        if let Some(listen) = &self.listen {
            return listen.clone();
        }
        let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
        format!("0.0.0.0:{port}")
    }
}

fn init_tracing(json: bool, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json, cli.verbose);

    let config =
        LabelerConfig::load(cli.config.as_deref()).context("Failed to load labeling policy")?;

    let auth = match &cli.access_token {
        Some(token) if !token.is_empty() => GcpAuth::static_token(token.clone()),
        _ => GcpAuth::metadata_server().context("Failed to set up metadata server auth")?,
    };
    let client = GcpClient::new(auth).context("Failed to create cloud client")?;

    let registry =
        labeler::plugins::builtin(&client, &config).context("Failed to register plugins")?;
    info!(plugins = registry.len(), "Plugin registry ready");

    let dispatcher = Dispatcher::new(
        Arc::new(registry),
        Arc::new(config.inclusion()),
        Arc::new(ResourceManager::new(client.clone())),
        Arc::new(PubSub::new(client, cli.host_project.clone())),
        cli.topic.clone(),
    );

    let addr = cli.listen_addr();
    let state = Arc::new(AppState::new(dispatcher, cli.pubsub_token));
    run_server(state, &addr).await
}
