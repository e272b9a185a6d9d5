//! Backend of a numbered-raffle ticketing app.
//!
//! Players register, reserve a set of raffle numbers, and pay for them. Payment is confirmed
//! either by an administrator directly or by the player uploading a photo of the receipt.
//!
//!
//!
//! # Ticket Batches
//!
//! A reservation is a **ticket batch**: one owner, the chosen numbers, the total owed, and a
//! status. Batches start `Owed` and move to `Cancelled` (meaning settled) exactly once in the
//! normal flow. See [`payments`] for the transitions and [`batches`] for storage.
//!
//! - No global uniqueness of numbers across batches, two players can hold the same number
//! - No locking between requests, the database row is the only shared state
//! - Batches are never deleted
//!
//!
//!
//! # Routes
//!
//! All under `/api`.
//!
//! | Method | Path | Auth |
//! |---|---|---|
//! | POST | `/auth/register` | - |
//! | POST | `/auth/login` | - |
//! | POST | `/auth/reset-password` | - |
//! | POST | `/reservations` | - |
//! | PUT | `/payments/{batch_id}/settle` | admin |
//! | POST | `/payments/{batch_id}/proof` | - |
//! | GET | `/batches/user/{owner_id}` | - |
//! | GET | `/batches` | admin |
//! | GET | `/health` | - |
//!
//! Uploaded proofs are served from `/uploads/<imageRef>`.
//!
//!
//!
//! # Setup
//!
//! Required secret, from the environment or `/run/secrets/JWT_SECRET`.
//! ```sh
//! export JWT_SECRET=change-me
//! ```
//!
//! Run with request logs.
//! ```sh
//! RUST_LOG=raffle=debug,tower_http=info cargo run -p raffle-backend
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post, put},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod batches;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod payloads;
pub mod payments;
pub mod routes;
pub mod state;
pub mod uploads;
pub mod utils;

use config::Config;
use routes::{
    health_handler, list_all_handler, list_by_owner_handler, login_handler, proof_handler,
    register_handler, reserve_handler, reset_password_handler, settle_handler,
};
use state::AppState;

pub fn init_tracing() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
}

pub async fn start_server(config: Config) -> Result<()> {
    info!("Initializing state...");
    let state = AppState::new(config).await?;

    info!("Starting server...");
    let app = router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("Server shutting down...");
    state.close().await;

    served.context("Server error")
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(state.config.cors_origins.clone())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(60 * 60));

    let api = Router::new()
        .route("/health", get(health_handler))
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/reset-password", post(reset_password_handler))
        .route("/reservations", post(reserve_handler))
        .route("/payments/{batch_id}/settle", put(settle_handler))
        .route("/payments/{batch_id}/proof", post(proof_handler))
        .route("/batches", get(list_all_handler))
        .route("/batches/user/{owner_id}", get(list_by_owner_handler));

    Router::new()
        .nest("/api", api)
        .nest_service("/uploads", ServeDir::new(state.proofs.dir()))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
