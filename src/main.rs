use cmm_gateway::config::Config;
use cmm_gateway::logger::LOG;
use cmm_gateway::router::{self, AppState};
use cmm_gateway::server;
use cmm_gateway::upstream::ip_cache;
use cmm_gateway::upstream::{AnthropicPassthrough, BearerAuth, GeminiClient, StaticToken};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        LOG.error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run() -> cmm_gateway::Result<()> {
    let config = Config::from_env()?;
    config.validate()?;

    LOG.info(&format!(
        "Mapping {}* → {}",
        config.mapping.source_model, config.mapping.target_model
    ));
    LOG.info(&format!("Gemini upstream: {}", config.upstream.endpoint));

    let ip = ip_cache::load_or_resolve(
        &config.ip_cache_path,
        &config.anthropic_host,
        config.anthropic_ip.as_deref(),
    )
    .await?;
    LOG.info(&format!(
        "Anthropic upstream: {} @ {}",
        config.anthropic_host, ip
    ));

    let auth = Arc::new(BearerAuth::new(Box::new(StaticToken::new(
        config.upstream.api_key.clone(),
    ))));
    let gemini = GeminiClient::new(config.upstream.clone(), auth)?;
    let anthropic = AnthropicPassthrough::new(config.anthropic_host.clone(), ip)?;

    let state = Arc::new(AppState {
        config: config.clone(),
        gemini,
        anthropic,
    });

    server::run(&config, router::app(state)).await
}
