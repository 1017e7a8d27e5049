//! In-process ledger storage
//!
//! Committed rows live in one table set behind a `RwLock`. A unit of work
//! stages its inserts and balance changes privately and publishes them in a
//! single write-locked step at commit, which gives read-committed isolation.
//!
//! Row locks are per-account `tokio::sync::Mutex` handles kept in a
//! `DashMap`. [`MemoryTx::add_account_balance`] acquires the owned guard and
//! keeps it until the unit of work ends, so concurrent updates of the same
//! account queue up exactly like `UPDATE` row locks in PostgreSQL, including
//! the possibility of deadlock when two units of work lock in opposite order.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::error::{ConstraintKind, LedgerError};
use super::models::{
    Account, CreateAccountParams, CreateEntryParams, CreateTransferParams, CreateUserParams, Entry,
    ListAccountsParams, ListEntriesParams, ListTransfersParams, Transfer, User,
};
use super::{LedgerStore, LedgerTx};

#[derive(Default)]
struct Tables {
    users: BTreeMap<String, User>,
    accounts: BTreeMap<i64, Account>,
    entries: BTreeMap<i64, Entry>,
    transfers: BTreeMap<i64, Transfer>,
}

#[derive(Default)]
struct Shared {
    tables: RwLock<Tables>,
    row_locks: DashMap<i64, Arc<Mutex<()>>>,
    account_seq: AtomicI64,
    entry_seq: AtomicI64,
    transfer_seq: AtomicI64,
}

impl Shared {
    fn row_lock(&self, id: i64) -> Arc<Mutex<()>> {
        Arc::clone(self.row_locks.entry(id).or_default().value())
    }

    /// Drop the lock entry for `id` unless someone still holds or awaits it
    fn forget_row_lock(&self, id: i64) {
        self.row_locks.remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

fn next_id(seq: &AtomicI64) -> i64 {
    seq.fetch_add(1, Ordering::SeqCst) + 1
}

/// `0001-01-01T00:00:00Z`, the "never changed" password timestamp
fn password_never_changed() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(-62_135_596_800, 0).unwrap_or_default()
}

fn page<'a, T: 'a>(
    rows: impl Iterator<Item = &'a T>,
    limit: i64,
    offset: i64,
) -> Result<Vec<T>, LedgerError>
where
    T: Clone,
{
    let limit = usize::try_from(limit)
        .map_err(|_| LedgerError::Storage(format!("LIMIT must not be negative: {}", limit)))?;
    let offset = usize::try_from(offset)
        .map_err(|_| LedgerError::Storage(format!("OFFSET must not be negative: {}", offset)))?;
    Ok(rows.skip(offset).take(limit).cloned().collect())
}

/// Thread-safe in-process [`LedgerStore`]. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Unit of work over a [`MemoryStore`]
pub struct MemoryTx {
    shared: Arc<Shared>,
    /// Row locks held until commit/rollback, keyed by account id
    locks: BTreeMap<i64, OwnedMutexGuard<()>>,
    /// Post-update balance per locked account
    balances: BTreeMap<i64, i64>,
    transfers: Vec<Transfer>,
    entries: Vec<Entry>,
    finished: bool,
}

impl MemoryTx {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            locks: BTreeMap::new(),
            balances: BTreeMap::new(),
            transfers: Vec::new(),
            entries: Vec::new(),
            finished: false,
        }
    }

    async fn lock_row(&mut self, id: i64) {
        if self.locks.contains_key(&id) {
            return;
        }
        let lock = self.shared.row_lock(id);
        let guard = lock.lock_owned().await;
        self.locks.insert(id, guard);
    }

    fn unlock_row(&mut self, id: i64) {
        if self.locks.remove(&id).is_some() {
            self.shared.forget_row_lock(id);
        }
    }

    fn has_writes(&self) -> bool {
        !(self.balances.is_empty() && self.transfers.is_empty() && self.entries.is_empty())
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if !self.finished && self.has_writes() {
            tracing::debug!(
                transfers = self.transfers.len(),
                entries = self.entries.len(),
                locked_rows = self.locks.len(),
                "Unfinished unit of work dropped, rolling back"
            );
        }
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn create_transfer(
        &mut self,
        params: CreateTransferParams,
    ) -> Result<Transfer, LedgerError> {
        if params.amount <= 0 {
            return Err(LedgerError::constraint(
                ConstraintKind::Check,
                "transfers_amount_positive",
                format!("transfer amount {} violates check constraint", params.amount),
            ));
        }

        {
            let tables = self.shared.tables.read().await;
            if !tables.accounts.contains_key(&params.from_account_id) {
                return Err(LedgerError::constraint(
                    ConstraintKind::ForeignKey,
                    "transfers_from_account_id_fkey",
                    format!("account {} does not exist", params.from_account_id),
                ));
            }
            if !tables.accounts.contains_key(&params.to_account_id) {
                return Err(LedgerError::constraint(
                    ConstraintKind::ForeignKey,
                    "transfers_to_account_id_fkey",
                    format!("account {} does not exist", params.to_account_id),
                ));
            }
        }

        let transfer = Transfer {
            id: next_id(&self.shared.transfer_seq),
            from_account_id: params.from_account_id,
            to_account_id: params.to_account_id,
            amount: params.amount,
            created_at: Utc::now(),
        };
        self.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn create_entry(&mut self, params: CreateEntryParams) -> Result<Entry, LedgerError> {
        {
            let tables = self.shared.tables.read().await;
            if !tables.accounts.contains_key(&params.account_id) {
                return Err(LedgerError::constraint(
                    ConstraintKind::ForeignKey,
                    "entries_account_id_fkey",
                    format!("account {} does not exist", params.account_id),
                ));
            }
        }

        let entry = Entry {
            id: next_id(&self.shared.entry_seq),
            account_id: params.account_id,
            amount: params.amount,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    async fn add_account_balance(&mut self, id: i64, delta: i64) -> Result<Account, LedgerError> {
        if !self.locks.contains_key(&id)
            && !self.shared.tables.read().await.accounts.contains_key(&id)
        {
            return Err(LedgerError::not_found("account", id));
        }
        self.lock_row(id).await;

        // The row may have been deleted while we waited for its lock
        let found = self.shared.tables.read().await.accounts.get(&id).cloned();
        let Some(mut account) = found else {
            self.unlock_row(id);
            return Err(LedgerError::not_found("account", id));
        };

        // Committed balance cannot move while we hold the row lock
        let current = self.balances.get(&id).copied().unwrap_or(account.balance);
        account.balance = current.checked_add(delta).ok_or_else(|| {
            LedgerError::Storage(format!("balance of account {} out of range", id))
        })?;

        self.balances.insert(id, account.balance);
        Ok(account)
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        let mut this = self;
        let shared = Arc::clone(&this.shared);
        let mut tables = shared.tables.write().await;

        // Entries and transfers do not lock their accounts; re-check the references
        // under the write lock so a concurrent delete cannot leave dangling rows.
        let referenced = this
            .entries
            .iter()
            .map(|e| ("entries_account_id_fkey", e.account_id))
            .chain(this.transfers.iter().flat_map(|t| {
                [
                    ("transfers_from_account_id_fkey", t.from_account_id),
                    ("transfers_to_account_id_fkey", t.to_account_id),
                ]
            }));
        for (constraint, account_id) in referenced {
            if !tables.accounts.contains_key(&account_id) {
                return Err(LedgerError::constraint(
                    ConstraintKind::ForeignKey,
                    constraint,
                    format!("account {} does not exist", account_id),
                ));
            }
        }

        for (id, balance) in std::mem::take(&mut this.balances) {
            if let Some(account) = tables.accounts.get_mut(&id) {
                account.balance = balance;
            }
        }
        for transfer in this.transfers.drain(..) {
            tables.transfers.insert(transfer.id, transfer);
        }
        for entry in this.entries.drain(..) {
            tables.entries.insert(entry.id, entry);
        }
        drop(tables);

        this.finished = true;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        let mut this = self;
        this.finished = true;
        tracing::debug!(
            transfers = this.transfers.len(),
            entries = this.entries.len(),
            "Unit of work rolled back"
        );
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, LedgerError> {
        Ok(Box::new(MemoryTx::new(Arc::clone(&self.shared))))
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        Ok(())
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<User, LedgerError> {
        let mut tables = self.shared.tables.write().await;
        if tables.users.contains_key(&params.username) {
            return Err(LedgerError::constraint(
                ConstraintKind::Unique,
                "users_pkey",
                format!("user {} already exists", params.username),
            ));
        }
        if tables.users.values().any(|u| u.email == params.email) {
            return Err(LedgerError::constraint(
                ConstraintKind::Unique,
                "users_email_key",
                format!("email {} already registered", params.email),
            ));
        }

        let user = User {
            username: params.username,
            hashed_password: params.hashed_password,
            full_name: params.full_name,
            email: params.email,
            password_changed_at: password_never_changed(),
            created_at: Utc::now(),
        };
        tables.users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, username: &str) -> Result<User, LedgerError> {
        let tables = self.shared.tables.read().await;
        tables
            .users
            .get(username)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("user", username))
    }

    async fn create_account(&self, params: CreateAccountParams) -> Result<Account, LedgerError> {
        let mut tables = self.shared.tables.write().await;
        if !tables.users.contains_key(&params.owner) {
            return Err(LedgerError::constraint(
                ConstraintKind::ForeignKey,
                "accounts_owner_fkey",
                format!("user {} does not exist", params.owner),
            ));
        }
        if tables
            .accounts
            .values()
            .any(|a| a.owner == params.owner && a.currency == params.currency)
        {
            return Err(LedgerError::constraint(
                ConstraintKind::Unique,
                "owner_currency_key",
                format!("{} already has a {} account", params.owner, params.currency),
            ));
        }

        let account = Account {
            id: next_id(&self.shared.account_seq),
            owner: params.owner,
            balance: params.balance,
            currency: params.currency,
            created_at: Utc::now(),
        };
        tables.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, id: i64) -> Result<Account, LedgerError> {
        let tables = self.shared.tables.read().await;
        tables
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("account", id))
    }

    async fn list_accounts(&self, params: ListAccountsParams) -> Result<Vec<Account>, LedgerError> {
        let tables = self.shared.tables.read().await;
        page(
            tables.accounts.values().filter(|a| a.owner == params.owner),
            params.limit,
            params.offset,
        )
    }

    async fn delete_account(&self, id: i64) -> Result<(), LedgerError> {
        let result = {
            // Wait for in-flight balance updates on this row
            let lock = self.shared.row_lock(id);
            let _row = lock.lock().await;

            let mut tables = self.shared.tables.write().await;
            if !tables.accounts.contains_key(&id) {
                Err(LedgerError::not_found("account", id))
            } else if tables.entries.values().any(|e| e.account_id == id) {
                Err(LedgerError::constraint(
                    ConstraintKind::ForeignKey,
                    "entries_account_id_fkey",
                    format!("account {} is still referenced from entries", id),
                ))
            } else if let Some(t) = tables
                .transfers
                .values()
                .find(|t| t.from_account_id == id || t.to_account_id == id)
            {
                let constraint = if t.from_account_id == id {
                    "transfers_from_account_id_fkey"
                } else {
                    "transfers_to_account_id_fkey"
                };
                Err(LedgerError::constraint(
                    ConstraintKind::ForeignKey,
                    constraint,
                    format!("account {} is still referenced from transfers", id),
                ))
            } else {
                tables.accounts.remove(&id);
                Ok(())
            }
        };

        if !matches!(result, Err(LedgerError::ConstraintViolation { .. })) {
            self.shared.forget_row_lock(id);
        }
        result
    }

    async fn get_entry(&self, id: i64) -> Result<Entry, LedgerError> {
        let tables = self.shared.tables.read().await;
        tables
            .entries
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("entry", id))
    }

    async fn list_entries(&self, params: ListEntriesParams) -> Result<Vec<Entry>, LedgerError> {
        let tables = self.shared.tables.read().await;
        page(
            tables
                .entries
                .values()
                .filter(|e| e.account_id == params.account_id),
            params.limit,
            params.offset,
        )
    }

    async fn get_transfer(&self, id: i64) -> Result<Transfer, LedgerError> {
        let tables = self.shared.tables.read().await;
        tables
            .transfers
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("transfer", id))
    }

    async fn list_transfers(
        &self,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        let tables = self.shared.tables.read().await;
        page(
            tables.transfers.values().filter(|t| {
                t.from_account_id == params.from_account_id
                    || t.to_account_id == params.to_account_id
            }),
            params.limit,
            params.offset,
        )
    }
}
