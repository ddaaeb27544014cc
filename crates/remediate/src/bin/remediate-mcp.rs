//! Remediate MCP Server - Exposes AI-driven issue investigation via Model Context Protocol.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use circuit_breaker::{CircuitBreakerFactory, CircuitState};
use remediate::ai::{AIProvider, AnthropicProvider, GenerateOptions, GuardedAiBackend};
use remediate::{
    FileSessionStore, Investigator, KubectlExecutor, McpServer, RemediateConfig, RemediateDomain,
};

/// MCP server for AI-driven Kubernetes issue investigation
#[derive(Parser, Debug)]
#[command(name = "remediate-mcp")]
#[command(version)]
struct Args {
    /// JSON config file
    #[arg(long, env = "REMEDIATE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for session files
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// AI model to use
    #[arg(long)]
    model: Option<String>,

    /// Namespace for data requests that name none
    #[arg(long)]
    namespace: Option<String>,

    /// kubectl context
    #[arg(long)]
    context: Option<String>,

    /// Emit logs as JSON
    #[arg(long, env = "REMEDIATE_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &Args) -> Result<RemediateConfig> {
    let mut config = RemediateConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;

    if let Some(dir) = &args.session_dir {
        config.session_dir.clone_from(dir);
    }
    if let Some(model) = &args.model {
        config.ai.model.clone_from(model);
    }
    if let Some(namespace) = &args.namespace {
        config.kubectl.default_namespace = Some(namespace.clone());
    }
    if let Some(context) = &args.context {
        config.kubectl.context = Some(context.clone());
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = load_config(&args)?;

    let breakers = Arc::new(
        CircuitBreakerFactory::new(config.circuit_breaker.clone()).with_listener(Arc::new(
            |from: CircuitState, to: CircuitState, name: &str| {
                debug!(circuit = %name, %from, %to, "Circuit listener notified");
            },
        )),
    );

    let mut provider = AnthropicProvider::from_env();
    if let Some(base_url) = &config.ai.base_url {
        provider = provider.with_base_url(base_url.clone());
    }
    if !provider.is_configured() {
        warn!("ANTHROPIC_API_KEY is not set; remediate calls will fail");
    }

    let ai = Arc::new(GuardedAiBackend::new(
        Arc::new(provider),
        &breakers,
        config.ai.model.clone(),
        GenerateOptions {
            temperature: config.ai.temperature,
            max_tokens: Some(config.ai.max_tokens),
            stop_sequences: None,
        },
    ));
    let cluster = Arc::new(KubectlExecutor::new(config.kubectl.clone()));
    let store = Arc::new(FileSessionStore::new(&config.session_dir));

    let investigator = Investigator::new(ai, cluster, store.clone())
        .context("Failed to initialise investigation prompts")?;
    let server = McpServer::new(RemediateDomain::new(investigator, store), breakers);

    info!(
        session_dir = %config.session_dir.display(),
        model = %config.ai.model,
        "remediate-mcp ready"
    );

    // Read from stdin, write to stdout (JSON-RPC over stdio)
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    server
        .serve(stdin, tokio::io::stdout())
        .await
        .context("stdio transport failed")
}
