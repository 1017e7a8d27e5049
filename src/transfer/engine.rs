//! Transfer Transaction Engine
//!
//! Runs each transfer as one atomic unit of work:
//!
//! ```text
//! begin ─▶ transfer row ─▶ debit entry ─▶ credit entry ─▶ balances (low id, high id) ─▶ commit
//!                 │               │              │                  │
//!                 └───────────────┴──────────────┴──────────────────┴──▶ rollback
//! ```
//!
//! Mutual exclusion is left entirely to the storage row locks. The engine only
//! fixes the order in which the two rows are locked: ascending account id,
//! whichever side is the sender. Two transfers over the same pair of accounts
//! in opposite directions therefore contend on the same first row instead of
//! each holding one row and waiting for the other.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use super::types::{TransferTxParams, TransferTxResult};
use crate::store::{
    Account, CreateEntryParams, CreateTransferParams, LedgerError, LedgerStore, LedgerTx,
};

/// Executes fund transfers against a [`LedgerStore`]
#[derive(Clone)]
pub struct TransferEngine {
    store: Arc<dyn LedgerStore>,
}

impl TransferEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Run `f` inside one unit of work.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`. If `f`
    /// panics or the returned future is dropped, the unit of work is dropped
    /// unfinished and the backend rolls it back.
    pub async fn exec_tx<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut Box<dyn LedgerTx>) -> BoxFuture<'t, Result<T, LedgerError>>
            + Send,
    {
        let mut tx = self.store.begin().await?;

        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => match tx.rollback().await {
                Ok(()) => Err(err),
                Err(rollback) => {
                    error!(error = %err, rollback_error = %rollback, "Rollback failed");
                    Err(LedgerError::RollbackFailed {
                        original: Box::new(err),
                        rollback: Box::new(rollback),
                    })
                }
            },
        }
    }

    /// Move `amount` from one account to another.
    ///
    /// Currency and ownership are the caller's concern. Storage errors are
    /// returned unchanged after the unit of work has been rolled back; there
    /// are no retries.
    pub async fn transfer_tx(
        &self,
        params: TransferTxParams,
    ) -> Result<TransferTxResult, LedgerError> {
        if params.amount <= 0 {
            return Err(LedgerError::InvalidAmount(params.amount));
        }
        if params.from_account_id == params.to_account_id {
            return Err(LedgerError::SameAccount(params.from_account_id));
        }

        let result = self
            .exec_tx(move |tx| Box::pin(apply_transfer(tx, params)))
            .await;

        match &result {
            Ok(res) => info!(
                transfer_id = res.transfer.id,
                from = params.from_account_id,
                to = params.to_account_id,
                amount = params.amount,
                "Transfer committed"
            ),
            Err(e) => warn!(
                from = params.from_account_id,
                to = params.to_account_id,
                amount = params.amount,
                error = %e,
                "Transfer rolled back"
            ),
        }
        result
    }
}

async fn apply_transfer(
    tx: &mut Box<dyn LedgerTx>,
    params: TransferTxParams,
) -> Result<TransferTxResult, LedgerError> {
    let TransferTxParams {
        from_account_id,
        to_account_id,
        amount,
    } = params;

    let transfer = tx
        .create_transfer(CreateTransferParams {
            from_account_id,
            to_account_id,
            amount,
        })
        .await?;

    let from_entry = tx
        .create_entry(CreateEntryParams {
            account_id: from_account_id,
            amount: -amount,
        })
        .await?;

    let to_entry = tx
        .create_entry(CreateEntryParams {
            account_id: to_account_id,
            amount,
        })
        .await?;

    let (from_account, to_account) = if from_account_id < to_account_id {
        add_balances(tx, (from_account_id, -amount), (to_account_id, amount)).await?
    } else {
        let (to_account, from_account) =
            add_balances(tx, (to_account_id, amount), (from_account_id, -amount)).await?;
        (from_account, to_account)
    };

    Ok(TransferTxResult {
        transfer,
        from_account,
        to_account,
        from_entry,
        to_entry,
    })
}

/// Apply two balance deltas, locking `first` before `second`
async fn add_balances(
    tx: &mut Box<dyn LedgerTx>,
    first: (i64, i64),
    second: (i64, i64),
) -> Result<(Account, Account), LedgerError> {
    debug!(first = first.0, second = second.0, "Locking account rows");
    let a = tx.add_account_balance(first.0, first.1).await?;
    let b = tx.add_account_balance(second.0, second.1).await?;
    Ok((a, b))
}
