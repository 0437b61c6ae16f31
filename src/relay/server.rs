use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use super::RelayError;
use crate::mistral_client::MistralClient;

pub const RELAY_PATH: &str = "/api/mistral";

#[derive(Clone)]
struct RelayState {
    client: Arc<MistralClient>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RelayRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RelayReply {
    pub reply: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub fn create_router(client: MistralClient) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route(RELAY_PATH, post(relay_message))
        .route("/health", get(health))
        .layer(trace_layer)
        .with_state(RelayState {
            client: Arc::new(client),
        })
}

/// Binds `addr` and serves the relay until Ctrl-C.
pub async fn serve(addr: SocketAddr, client: MistralClient) -> Result<()> {
    info!(
        model = client.model(),
        endpoint = %client.endpoint(),
        "starting relay (api key {})",
        if client.has_api_key() { "loaded" } else { "missing" }
    );

    let listener = TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("failed to bind {addr}"))?;
    info!("relay listening on http://{}{}", listener.local_addr()?, RELAY_PATH);

    axum::serve(listener, create_router(client))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .wrap_err("relay server failed")?;

    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn relay_message(
    State(state): State<RelayState>,
    body: Bytes,
) -> Result<Json<RelayReply>, RelayError> {
    // The body is JSON whatever the Content-Type header says.
    let request: RelayRequest = serde_json::from_slice(&body)
        .map_err(|e| RelayError::BadRequest(format!("Invalid JSON body: {e}")))?;
    let message = request
        .message
        .ok_or_else(|| RelayError::BadRequest("Missing message".to_string()))?;

    let reply = state.client.complete(&message).await?;
    Ok(Json(RelayReply { reply }))
}
