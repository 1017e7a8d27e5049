//! HTTP Gateway
//!
//! ```text
//! /api/v1
//! ├── GET  /health                      public
//! ├── POST /users                       public
//! ├── POST /users/login                 public
//! ├── POST /accounts                    bearer
//! ├── GET  /accounts                    bearer
//! ├── GET  /accounts/{id}               bearer
//! ├── GET  /accounts/{id}/entries       bearer
//! ├── GET  /accounts/{id}/transfers     bearer
//! └── POST /transfers                   bearer
//! ```

pub mod handlers;
pub mod state;
pub mod types;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::user_auth::jwt_auth_middleware;
use state::AppState;

/// Build the complete API router
pub fn build_router(state: Arc<AppState>) -> Router {
    // ==========================================================================
    // Public Routes (no auth required)
    // ==========================================================================
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/users", post(handlers::create_user))
        .route("/users/login", post(handlers::login_user));

    // ==========================================================================
    // Private Routes (bearer token required)
    // ==========================================================================
    let private_routes = Router::new()
        .route(
            "/accounts",
            post(handlers::create_account).get(handlers::list_accounts),
        )
        .route("/accounts/{id}", get(handlers::get_account))
        .route("/accounts/{id}/entries", get(handlers::list_account_entries))
        .route(
            "/accounts/{id}/transfers",
            get(handlers::list_account_transfers),
        )
        .route("/transfers", post(handlers::create_transfer))
        .layer(from_fn_with_state(state.clone(), jwt_auth_middleware));

    Router::new()
        .nest("/api/v1", public_routes.merge(private_routes))
        .with_state(state)
}

/// Start HTTP Gateway server
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> std::io::Result<()> {
    let app = build_router(state);

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await.inspect_err(|e| {
        tracing::error!("Failed to bind to {}: {}", addr, e);
    })?;

    tracing::info!("Gateway listening on http://{}", addr);
    tracing::info!("API base: /api/v1 (accounts, transfers require a bearer token)");

    axum::serve(listener, app).await
}
