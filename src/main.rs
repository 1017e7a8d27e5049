//! Ledger Bank gateway
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │  Config  │───▶│  Store   │───▶│ Service  │───▶│ Gateway  │
//! │  (YAML)  │    │(PG / mem)│    │ (guard)  │    │  (axum)  │
//! └──────────┘    └──────────┘    └──────────┘    └──────────┘
//! ```
//!
//! Flags: `--env <name>` selects `config/<name>.yaml` (default `dev`),
//! `--port <n>` overrides the gateway port.

use std::sync::Arc;

use anyhow::Context;

use ledger_bank::config::AppConfig;
use ledger_bank::gateway::{self, state::AppState};
use ledger_bank::service::{BankService, TokenSettings};
use ledger_bank::store::{Database, LedgerStore, MemoryStore, PgStore};
use ledger_bank::user_auth::JwtMaker;

fn get_arg(name: &str) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1).cloned())
}

fn get_env() -> String {
    get_arg("--env").unwrap_or_else(|| "dev".to_string())
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    get_arg("--port").and_then(|p| p.parse().ok())
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match &config.postgres_url {
        Some(url) => {
            let db = Database::connect(url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            db.migrate().await.context("Failed to apply migrations")?;
            Ok(Arc::new(PgStore::new(db)))
        }
        None => {
            tracing::warn!(
                "postgres_url not set, using in-process storage (data is not persisted)"
            );
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut config = AppConfig::load(&env).context("Failed to load configuration")?;
    if let Some(port) = get_port_override() {
        config.gateway.port = port;
    }
    let _log_guard = ledger_bank::logging::init_logging(&config);

    tracing::info!("Starting Ledger Bank in {} mode", env);

    let store = open_store(&config).await?;
    let tokens = JwtMaker::new(
        &config.token.secret,
        &config.token.audience,
        &config.token.issuer,
    )
    .context("Invalid token configuration")?;

    let service = BankService::new(
        store,
        Arc::new(tokens),
        TokenSettings {
            audience: config.token.audience.clone(),
            issuer: config.token.issuer.clone(),
            duration: config.token.access_token_duration(),
        },
    );
    let state = Arc::new(AppState::new(service));

    gateway::run_server(&config.gateway.host, config.gateway.port, state)
        .await
        .context("Gateway server failed")?;
    Ok(())
}
