//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use rand::Rng;
use rand::distributions::Alphanumeric;

use ledger_bank::store::{
    Account, CreateAccountParams, CreateEntryParams, CreateTransferParams, CreateUserParams,
    Currency, Entry, LedgerError, LedgerStore, LedgerTx, ListAccountsParams, ListEntriesParams,
    ListTransfersParams, MemoryStore, Transfer, User,
};

pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn random_owner() -> String {
    format!("u{}", random_string(10).to_lowercase())
}

pub async fn create_random_user(store: &dyn LedgerStore) -> User {
    let username = random_owner();
    store
        .create_user(CreateUserParams {
            email: format!("{}@example.com", username),
            username,
            hashed_password: "not-a-real-hash".to_string(),
            full_name: format!("Test {}", random_string(6)),
        })
        .await
        .expect("create user")
}

pub async fn create_account_with_balance(store: &dyn LedgerStore, balance: i64) -> Account {
    let user = create_random_user(store).await;
    store
        .create_account(CreateAccountParams {
            owner: user.username,
            balance,
            currency: Currency::Usd,
        })
        .await
        .expect("create account")
}

pub async fn balance_of(store: &dyn LedgerStore, id: i64) -> i64 {
    store.get_account(id).await.expect("get account").balance
}

pub async fn entries_of(store: &dyn LedgerStore, account_id: i64) -> Vec<Entry> {
    store
        .list_entries(ListEntriesParams {
            account_id,
            limit: 1_000,
            offset: 0,
        })
        .await
        .expect("list entries")
}

pub async fn transfers_of(store: &dyn LedgerStore, account_id: i64) -> Vec<Transfer> {
    store
        .list_transfers(ListTransfersParams {
            from_account_id: account_id,
            to_account_id: account_id,
            limit: 1_000,
            offset: 0,
        })
        .await
        .expect("list transfers")
}

// ============================================================================
// Fault injection
// ============================================================================

/// Meeting point for units of work that each hold their first row lock.
///
/// A party arriving waits until `parties` have arrived or `patience` runs
/// out, whichever comes first.
pub struct LockRendezvous {
    parties: usize,
    patience: Duration,
    arrived: AtomicUsize,
    notify: Notify,
}

impl LockRendezvous {
    pub fn new(parties: usize, patience: Duration) -> Self {
        Self {
            parties,
            patience,
            arrived: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    pub async fn arrive(&self) {
        let notified = self.notify.notified();
        if self.arrived.fetch_add(1, Ordering::SeqCst) + 1 >= self.parties {
            self.notify.notify_waiters();
            return;
        }
        let _ = tokio::time::timeout(self.patience, notified).await;
    }

    pub fn arrived(&self) -> usize {
        self.arrived.load(Ordering::SeqCst)
    }
}

/// [`MemoryStore`] whose units of work fail on a chosen write.
///
/// Writes are counted per unit of work starting at 1, in call order:
/// transfer row, debit entry, credit entry, first balance, second balance.
/// `fail_on_write = 0` never fails.
pub struct FaultyStore {
    inner: MemoryStore,
    fail_on_write: usize,
    fail_rollback: bool,
    rendezvous: Option<Arc<LockRendezvous>>,
    begun: Arc<AtomicUsize>,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore, fail_on_write: usize) -> Self {
        Self {
            inner,
            fail_on_write,
            fail_rollback: false,
            rendezvous: None,
            begun: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Hold every unit of work at `rendezvous` right after its first balance
    /// update, while it owns that row lock
    pub fn with_rendezvous(mut self, rendezvous: Arc<LockRendezvous>) -> Self {
        self.rendezvous = Some(rendezvous);
        self
    }

    /// Also make rollback report a failure
    pub fn with_failing_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    pub fn units_begun(&self) -> usize {
        self.begun.load(Ordering::SeqCst)
    }
}

pub struct FaultyTx {
    inner: Box<dyn LedgerTx>,
    writes: usize,
    balance_updates: usize,
    fail_on_write: usize,
    fail_rollback: bool,
    rendezvous: Option<Arc<LockRendezvous>>,
}

impl FaultyTx {
    fn step(&mut self) -> Result<(), LedgerError> {
        self.writes += 1;
        if self.writes == self.fail_on_write {
            return Err(LedgerError::Storage(format!(
                "injected failure on write {}",
                self.writes
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for FaultyTx {
    async fn create_transfer(
        &mut self,
        params: CreateTransferParams,
    ) -> Result<Transfer, LedgerError> {
        self.step()?;
        self.inner.create_transfer(params).await
    }

    async fn create_entry(&mut self, params: CreateEntryParams) -> Result<Entry, LedgerError> {
        self.step()?;
        self.inner.create_entry(params).await
    }

    async fn add_account_balance(&mut self, id: i64, delta: i64) -> Result<Account, LedgerError> {
        self.step()?;
        let account = self.inner.add_account_balance(id, delta).await?;
        self.balance_updates += 1;
        if self.balance_updates == 1 {
            if let Some(rendezvous) = &self.rendezvous {
                rendezvous.arrive().await;
            }
        }
        Ok(account)
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        let fail = self.fail_rollback;
        self.inner.rollback().await?;
        if fail {
            return Err(LedgerError::StorageUnavailable(
                "injected rollback failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, LedgerError> {
        self.begun.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FaultyTx {
            inner: self.inner.begin().await?,
            writes: 0,
            balance_updates: 0,
            fail_on_write: self.fail_on_write,
            fail_rollback: self.fail_rollback,
            rendezvous: self.rendezvous.clone(),
        }))
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        self.inner.ping().await
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<User, LedgerError> {
        self.inner.create_user(params).await
    }

    async fn get_user(&self, username: &str) -> Result<User, LedgerError> {
        self.inner.get_user(username).await
    }

    async fn create_account(&self, params: CreateAccountParams) -> Result<Account, LedgerError> {
        self.inner.create_account(params).await
    }

    async fn get_account(&self, id: i64) -> Result<Account, LedgerError> {
        self.inner.get_account(id).await
    }

    async fn list_accounts(&self, params: ListAccountsParams) -> Result<Vec<Account>, LedgerError> {
        self.inner.list_accounts(params).await
    }

    async fn delete_account(&self, id: i64) -> Result<(), LedgerError> {
        self.inner.delete_account(id).await
    }

    async fn get_entry(&self, id: i64) -> Result<Entry, LedgerError> {
        self.inner.get_entry(id).await
    }

    async fn list_entries(&self, params: ListEntriesParams) -> Result<Vec<Entry>, LedgerError> {
        self.inner.list_entries(params).await
    }

    async fn get_transfer(&self, id: i64) -> Result<Transfer, LedgerError> {
        self.inner.get_transfer(id).await
    }

    async fn list_transfers(
        &self,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        self.inner.list_transfers(params).await
    }
}
