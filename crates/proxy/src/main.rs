use std::sync::Arc;

use banter_llm::{MistralProvider, ProviderConfig};
use banter_proxy::config::ProxyConfig;
use banter_proxy::server::{AppState, router};
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = ProxyConfig::load().expect("failed to load proxy configuration");

    let provider = MistralProvider::new(ProviderConfig::new(
        config.api_key.clone(),
        config.base_url.clone(),
        Some(config.default_model.clone()),
    ))
    .expect("failed to initialize upstream provider");

    let state = Arc::new(AppState {
        provider: Arc::new(provider),
    });

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind listen address");

    info!(addr = %config.listen_addr, "banter proxy listening");

    axum::serve(listener, router(state))
        .await
        .expect("server error");
}
