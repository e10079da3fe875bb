//! Northbound HTTP surface: router, shared state, startup and shutdown.

pub mod auth;
pub mod completions;
pub mod error;
pub mod models;
pub mod stream;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::aws::{Credentials, Signer};
use crate::client::RelayClient;
use crate::config::Config;
use crate::models::ModelCache;

/// SigV4 service name for both the runtime and control-plane hosts.
const SIGNING_SERVICE: &str = "bedrock";

#[derive(Clone)]
pub struct AppState {
	pub config: Arc<Config>,
	pub client: RelayClient,
	pub models: Arc<ModelCache>,
}

impl AppState {
	pub fn new(config: Config, credentials: Credentials) -> anyhow::Result<Self> {
		let http = reqwest::Client::builder()
			.connect_timeout(Duration::from_secs(10))
			.build()?;
		let signer = Signer::new(credentials, config.region.clone(), SIGNING_SERVICE);
		let client = RelayClient::new(http, signer, config.max_retries);
		let models = Arc::new(ModelCache::new(
			client.clone(),
			config.control_endpoint(),
			config.model_cache_ttl(),
			config.models_timeout(),
		));
		Ok(Self {
			config: Arc::new(config),
			client,
			models,
		})
	}
}

pub fn router(state: AppState) -> Router {
	let gated = Router::new()
		.route("/v1/models", get(models::list))
		.route("/v1/models/{id}", get(models::get))
		.route("/v1/chat/completions", post(completions::handle))
		// The handler enforces the documented 10 MiB cap with a 400; this
		// just keeps axum from buffering unbounded bodies first.
		.layer(DefaultBodyLimit::max(completions::MAX_BODY_BYTES + 1024))
		.route_layer(middleware::from_fn_with_state(
			state.clone(),
			auth::require_api_key,
		));

	Router::new()
		.route("/health", get(health))
		.merge(gated)
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

async fn health() -> Json<serde_json::Value> {
	Json(json!({"status": "ok"}))
}

/// Bind, serve, and drain on SIGINT/SIGTERM. Shared state (HTTP pool,
/// model cache) drops after the listener closes and in-flight responses
/// finish.
pub async fn serve(config: Config) -> anyhow::Result<()> {
	let credentials = Credentials::resolve().await?;
	let addr = format!("{}:{}", config.host, config.port);
	let state = AppState::new(config, credentials)?;
	let listener = tokio::net::TcpListener::bind(&addr).await?;
	info!(%addr, "bedrock-relay listening");
	axum::serve(listener, router(state))
		.with_graceful_shutdown(shutdown_signal())
		.await?;
	info!("shutdown complete");
	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		let _ = tokio::signal::ctrl_c().await;
	};
	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut sig) => {
				sig.recv().await;
			},
			Err(_) => std::future::pending().await,
		}
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
	info!("shutdown signal received; draining connections");
}
