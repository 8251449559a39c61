use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use analyst_agent::Analyzer;
use analyst_config::Config;
use analyst_guac::GuacClient;
use analyst_provider::OpenAiProvider;

use guac_analyst::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guac_analyst=info,tower_http=info".into()),
        )
        .init();

    let cfg = Config::from_env().context("failed to load configuration")?;

    let guac_client = GuacClient::new(cfg.guac.graphql_endpoint.clone(), cfg.guac.timeout)
        .context("failed to create GUAC client")?;
    let provider = OpenAiProvider::new(cfg.openai.clone());
    let analyzer = Arc::new(Analyzer::new(guac_client, provider));

    info!(host = %cfg.server.host, port = cfg.server.port, "starting server");
    server::run(&cfg.server, analyzer).await
}
