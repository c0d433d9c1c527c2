use std::net::SocketAddr;

use axum::{Router, routing::get};
use relaylink::{
    common::{logger, types::AnyResult},
    configs::Config,
    server::AppState,
    transport,
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> AnyResult<()> {
    let (config, load_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    logger::init(&config);
    if let Some(e) = load_error {
        warn!("Using built-in configuration: {}", e);
    }

    let state = AppState::new(config);

    let app = Router::new()
        .route(
            "/v4/websocket",
            get(transport::websocket_server::websocket_handler),
        )
        .merge(transport::http_server::router(state.clone()))
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http());

    let address: SocketAddr =
        format!("{}:{}", state.config.server.host, state.config.server.port).parse()?;
    info!("Relaylink listening on {}", address);

    let listener = tokio::net::TcpListener::bind(address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let dropped = state.sessions.shutdown_all();
    info!("Shut down {} sessions", dropped);

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
