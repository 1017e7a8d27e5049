//! Ledger storage
//!
//! Accounts, entries, transfers and users behind two traits:
//!
//! - [`LedgerStore`]: autocommit reads/writes plus [`LedgerStore::begin`]
//! - [`LedgerTx`]: one atomic unit of work
//!
//! Backends:
//! - [`postgres::PgStore`]: PostgreSQL via sqlx
//! - [`memory::MemoryStore`]: in-process tables with row-level locks

pub mod db;
pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;

pub use db::Database;
pub use error::{ConstraintKind, LedgerError};
pub use memory::MemoryStore;
pub use models::{
    Account, CreateAccountParams, CreateEntryParams, CreateTransferParams, CreateUserParams,
    Currency, Entry, ListAccountsParams, ListEntriesParams, ListTransfersParams, Transfer, User,
};
pub use postgres::PgStore;

/// Autocommit storage operations. Each call is its own unit of work.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a unit of work. Dropping the returned handle without calling
    /// [`LedgerTx::commit`] rolls it back.
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, LedgerError>;

    /// Cheap reachability check for health checks
    async fn ping(&self) -> Result<(), LedgerError>;

    async fn create_user(&self, params: CreateUserParams) -> Result<User, LedgerError>;
    async fn get_user(&self, username: &str) -> Result<User, LedgerError>;

    async fn create_account(&self, params: CreateAccountParams) -> Result<Account, LedgerError>;
    async fn get_account(&self, id: i64) -> Result<Account, LedgerError>;
    async fn list_accounts(&self, params: ListAccountsParams) -> Result<Vec<Account>, LedgerError>;
    async fn delete_account(&self, id: i64) -> Result<(), LedgerError>;

    async fn get_entry(&self, id: i64) -> Result<Entry, LedgerError>;
    async fn list_entries(&self, params: ListEntriesParams) -> Result<Vec<Entry>, LedgerError>;

    async fn get_transfer(&self, id: i64) -> Result<Transfer, LedgerError>;
    async fn list_transfers(
        &self,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError>;
}

/// Writes performed inside one atomic unit of work.
///
/// Nothing written here is visible to other readers until [`LedgerTx::commit`].
#[async_trait]
pub trait LedgerTx: Send {
    async fn create_transfer(
        &mut self,
        params: CreateTransferParams,
    ) -> Result<Transfer, LedgerError>;

    async fn create_entry(&mut self, params: CreateEntryParams) -> Result<Entry, LedgerError>;

    /// Add `delta` to the account balance and return the updated row.
    ///
    /// Takes the account's row lock; it stays held until the unit of work ends.
    async fn add_account_balance(&mut self, id: i64, delta: i64) -> Result<Account, LedgerError>;

    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError>;
}
