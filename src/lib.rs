//! Ledger Bank - account service backed by a double-entry ledger
//!
//! # Modules
//!
//! - [`store`] - Ledger storage traits with PostgreSQL and in-process backends
//! - [`transfer`] - Transactional transfer engine
//! - [`service`] - Users, accounts and the transfer authorization guard
//! - [`user_auth`] - Access tokens, password hashing, bearer middleware
//! - [`gateway`] - HTTP API (axum)
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod gateway;
pub mod logging;
pub mod service;
pub mod store;
pub mod transfer;
pub mod user_auth;

// Convenient re-exports at crate root
pub use service::{BankService, ServiceError};
pub use store::{LedgerError, LedgerStore, LedgerTx, MemoryStore, PgStore};
pub use transfer::{TransferEngine, TransferTxParams, TransferTxResult};
