use std::path::PathBuf;
use std::sync::Arc;

use adapter_registry::Registry;
use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use adapter::config::AdapterConfig;

#[derive(Parser, Debug)]
#[command(name = "llm-adapter", about = "Provider-agnostic LLM adapter server")]
struct Args {
    /// Path to a YAML config file.
    #[arg(long, env = "LLM_ADAPTER_CONFIG")]
    config: Option<PathBuf>,

    /// Listen host override.
    #[arg(long, env = "LLM_ADAPTER_HOST")]
    host: Option<String>,

    /// Listen port override.
    #[arg(long, env = "LLM_ADAPTER_PORT")]
    port: Option<u16>,

    /// Plugins directory override.
    #[arg(long, env = "LLM_ADAPTER_PLUGINS_DIR")]
    plugins_dir: Option<PathBuf>,

    /// Log filter, e.g. "info" or "adapter=debug".
    #[arg(long, env = "LLM_ADAPTER_LOG", default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = AdapterConfig::load(args.config.as_deref()).context("loading config")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(plugins_dir) = args.plugins_dir {
        config.plugins_dir = plugins_dir;
    }

    adapter::logging::init(&config.logging);

    let registry = Arc::new(Registry::new(config.plugins_dir.clone()));
    registry.load_all();

    adapter::server::serve(config, registry)
        .await
        .context("server failed")?;
    Ok(())
}
