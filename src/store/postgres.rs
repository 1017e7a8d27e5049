//! PostgreSQL ledger storage
//!
//! Balance updates are single `UPDATE ... RETURNING` statements, so the row
//! lock PostgreSQL takes for the update is what serializes concurrent
//! transfers touching the same account. The lock is released at commit or
//! rollback of the surrounding transaction.

use async_trait::async_trait;
use sqlx::postgres::{PgExecutor, PgRow};
use sqlx::{Postgres, Row, Transaction};

use super::db::Database;
use super::error::LedgerError;
use super::models::{
    Account, CreateAccountParams, CreateEntryParams, CreateTransferParams, CreateUserParams,
    Currency, Entry, ListAccountsParams, ListEntriesParams, ListTransfersParams, Transfer, User,
};
use super::{LedgerStore, LedgerTx};

/// [`LedgerStore`] backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    db: Database,
}

impl PgStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

/// One PostgreSQL transaction. Dropping it without commit rolls back.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

// ============================================================================
// Row mapping
// ============================================================================

fn row_to_account(row: &PgRow) -> Result<Account, LedgerError> {
    let currency: String = row.try_get("currency")?;
    let currency: Currency = currency
        .parse()
        .map_err(|e: super::models::UnsupportedCurrency| LedgerError::Storage(e.to_string()))?;

    Ok(Account {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        balance: row.try_get("balance")?,
        currency,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_entry(row: &PgRow) -> Result<Entry, LedgerError> {
    Ok(Entry {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        amount: row.try_get("amount")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_transfer(row: &PgRow) -> Result<Transfer, LedgerError> {
    Ok(Transfer {
        id: row.try_get("id")?,
        from_account_id: row.try_get("from_account_id")?,
        to_account_id: row.try_get("to_account_id")?,
        amount: row.try_get("amount")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_user(row: &PgRow) -> Result<User, LedgerError> {
    Ok(User {
        username: row.try_get("username")?,
        hashed_password: row.try_get("hashed_password")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        password_changed_at: row.try_get("password_changed_at")?,
        created_at: row.try_get("created_at")?,
    })
}

// ============================================================================
// Unit-of-work queries (run on the transaction connection)
// ============================================================================

async fn insert_transfer<'e, E>(
    executor: E,
    params: CreateTransferParams,
) -> Result<Transfer, LedgerError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(
        r#"INSERT INTO transfers (from_account_id, to_account_id, amount)
           VALUES ($1, $2, $3)
           RETURNING id, from_account_id, to_account_id, amount, created_at"#,
    )
    .bind(params.from_account_id)
    .bind(params.to_account_id)
    .bind(params.amount)
    .fetch_one(executor)
    .await?;

    row_to_transfer(&row)
}

async fn insert_entry<'e, E>(executor: E, params: CreateEntryParams) -> Result<Entry, LedgerError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(
        r#"INSERT INTO entries (account_id, amount)
           VALUES ($1, $2)
           RETURNING id, account_id, amount, created_at"#,
    )
    .bind(params.account_id)
    .bind(params.amount)
    .fetch_one(executor)
    .await?;

    row_to_entry(&row)
}

async fn add_balance<'e, E>(executor: E, id: i64, delta: i64) -> Result<Account, LedgerError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(
        r#"UPDATE accounts SET balance = balance + $1
           WHERE id = $2
           RETURNING id, owner, balance, currency, created_at"#,
    )
    .bind(delta)
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| LedgerError::not_found("account", id))?;

    row_to_account(&row)
}

#[async_trait]
impl LedgerTx for PgTx {
    async fn create_transfer(
        &mut self,
        params: CreateTransferParams,
    ) -> Result<Transfer, LedgerError> {
        insert_transfer(&mut *self.tx, params).await
    }

    async fn create_entry(&mut self, params: CreateEntryParams) -> Result<Entry, LedgerError> {
        insert_entry(&mut *self.tx, params).await
    }

    async fn add_account_balance(&mut self, id: i64, delta: i64) -> Result<Account, LedgerError> {
        add_balance(&mut *self.tx, id, delta).await
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), LedgerError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

// ============================================================================
// Autocommit queries
// ============================================================================

#[async_trait]
impl LedgerStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, LedgerError> {
        let tx = self.db.pool().begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        self.db.health_check().await
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<User, LedgerError> {
        let row = sqlx::query(
            r#"INSERT INTO users (username, hashed_password, full_name, email)
               VALUES ($1, $2, $3, $4)
               RETURNING username, hashed_password, full_name, email,
                         password_changed_at, created_at"#,
        )
        .bind(&params.username)
        .bind(&params.hashed_password)
        .bind(&params.full_name)
        .bind(&params.email)
        .fetch_one(self.db.pool())
        .await?;

        row_to_user(&row)
    }

    async fn get_user(&self, username: &str) -> Result<User, LedgerError> {
        let row = sqlx::query(
            r#"SELECT username, hashed_password, full_name, email, password_changed_at, created_at
               FROM users WHERE username = $1"#,
        )
        .bind(username)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| LedgerError::not_found("user", username))?;

        row_to_user(&row)
    }

    async fn create_account(&self, params: CreateAccountParams) -> Result<Account, LedgerError> {
        let row = sqlx::query(
            r#"INSERT INTO accounts (owner, balance, currency)
               VALUES ($1, $2, $3)
               RETURNING id, owner, balance, currency, created_at"#,
        )
        .bind(&params.owner)
        .bind(params.balance)
        .bind(params.currency.as_str())
        .fetch_one(self.db.pool())
        .await?;

        row_to_account(&row)
    }

    async fn get_account(&self, id: i64) -> Result<Account, LedgerError> {
        let row = sqlx::query(
            r#"SELECT id, owner, balance, currency, created_at
               FROM accounts WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| LedgerError::not_found("account", id))?;

        row_to_account(&row)
    }

    async fn list_accounts(&self, params: ListAccountsParams) -> Result<Vec<Account>, LedgerError> {
        let rows = sqlx::query(
            r#"SELECT id, owner, balance, currency, created_at
               FROM accounts
               WHERE owner = $1
               ORDER BY id
               LIMIT $2 OFFSET $3"#,
        )
        .bind(&params.owner)
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(row_to_account).collect()
    }

    async fn delete_account(&self, id: i64) -> Result<(), LedgerError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found("account", id));
        }
        Ok(())
    }

    async fn get_entry(&self, id: i64) -> Result<Entry, LedgerError> {
        let row = sqlx::query(
            r#"SELECT id, account_id, amount, created_at
               FROM entries WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| LedgerError::not_found("entry", id))?;

        row_to_entry(&row)
    }

    async fn list_entries(&self, params: ListEntriesParams) -> Result<Vec<Entry>, LedgerError> {
        let rows = sqlx::query(
            r#"SELECT id, account_id, amount, created_at
               FROM entries
               WHERE account_id = $1
               ORDER BY id
               LIMIT $2 OFFSET $3"#,
        )
        .bind(params.account_id)
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn get_transfer(&self, id: i64) -> Result<Transfer, LedgerError> {
        let row = sqlx::query(
            r#"SELECT id, from_account_id, to_account_id, amount, created_at
               FROM transfers WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| LedgerError::not_found("transfer", id))?;

        row_to_transfer(&row)
    }

    async fn list_transfers(
        &self,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        let rows = sqlx::query(
            r#"SELECT id, from_account_id, to_account_id, amount, created_at
               FROM transfers
               WHERE from_account_id = $1 OR to_account_id = $2
               ORDER BY id
               LIMIT $3 OFFSET $4"#,
        )
        .bind(params.from_account_id)
        .bind(params.to_account_id)
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(row_to_transfer).collect()
    }
}
