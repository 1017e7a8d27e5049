//! Bank Service
//!
//! User registration/login, account management and the authorization guard
//! in front of [`TransferEngine`]. Every operation takes the verified token
//! subject as `owner`; nothing here reads request headers.

pub mod error;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::store::{
    Account, CreateAccountParams, CreateUserParams, Currency, Entry, LedgerStore,
    ListAccountsParams, ListEntriesParams, ListTransfersParams, Transfer, User,
};
use crate::transfer::{TransferEngine, TransferTxParams, TransferTxResult};
use crate::user_auth::{PayloadParams, TokenMaker, hash_password, verify_password};

pub use error::ServiceError;

pub const MIN_PAGE_SIZE: i64 = 5;
pub const MAX_PAGE_SIZE: i64 = 10;

/// Claims stamped into issued access tokens
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub audience: String,
    pub issuer: String,
    pub duration: Duration,
}

/// User row without the password hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub password_changed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(u: User) -> Self {
        Self {
            username: u.username,
            full_name: u.full_name,
            email: u.email,
            password_changed_at: u.password_changed_at,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub user: UserView,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub email: String,
}

/// Transfer as requested by an authenticated owner
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
    pub currency: Currency,
}

/// 1-based page selector
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page_id: i64,
    pub page_size: i64,
}

impl Page {
    /// `(limit, offset)` for the storage query
    pub fn limit_offset(self) -> Result<(i64, i64), ServiceError> {
        if self.page_id < 1 {
            return Err(ServiceError::InvalidInput(format!(
                "page_id must be >= 1, got {}",
                self.page_id
            )));
        }
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(ServiceError::InvalidInput(format!(
                "page_size must be in {}..={}, got {}",
                MIN_PAGE_SIZE, MAX_PAGE_SIZE, self.page_size
            )));
        }
        let offset = (self.page_id - 1)
            .checked_mul(self.page_size)
            .ok_or_else(|| {
                ServiceError::InvalidInput(format!("page_id {} is out of range", self.page_id))
            })?;
        Ok((self.page_size, offset))
    }
}

#[derive(Clone)]
pub struct BankService {
    store: Arc<dyn LedgerStore>,
    engine: TransferEngine,
    tokens: Arc<dyn TokenMaker>,
    token_settings: TokenSettings,
}

impl BankService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        tokens: Arc<dyn TokenMaker>,
        token_settings: TokenSettings,
    ) -> Self {
        Self {
            engine: TransferEngine::new(store.clone()),
            store,
            tokens,
            token_settings,
        }
    }

    pub fn tokens(&self) -> &Arc<dyn TokenMaker> {
        &self.tokens
    }

    pub fn engine(&self) -> &TransferEngine {
        &self.engine
    }

    pub async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(self.store.ping().await?)
    }

    // ------------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------------

    pub async fn create_user(&self, new_user: NewUser) -> Result<UserView, ServiceError> {
        let hashed_password = hash_password(&new_user.password)?;
        let user = self
            .store
            .create_user(CreateUserParams {
                username: new_user.username,
                hashed_password,
                full_name: new_user.full_name,
                email: new_user.email,
            })
            .await?;

        info!(username = %user.username, "User created");
        Ok(user.into())
    }

    pub async fn login_user(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LoginResponse, ServiceError> {
        let user = self.store.get_user(username).await?;
        verify_password(password, &user.hashed_password)?;

        let (access_token, payload) = self.tokens.create_token(PayloadParams::new(
            user.username.clone(),
            self.token_settings.audience.clone(),
            self.token_settings.issuer.clone(),
            self.token_settings.duration,
        ))?;

        debug!(username = %user.username, token_id = %payload.id, "Access token issued");
        Ok(LoginResponse {
            access_token,
            access_token_expires_at: payload.expired_at,
            user: user.into(),
        })
    }

    // ------------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------------

    pub async fn create_account(
        &self,
        owner: &str,
        currency: Currency,
    ) -> Result<Account, ServiceError> {
        let account = self
            .store
            .create_account(CreateAccountParams {
                owner: owner.to_string(),
                balance: 0,
                currency,
            })
            .await?;

        info!(owner, account_id = account.id, %currency, "Account created");
        Ok(account)
    }

    pub async fn get_account(&self, owner: &str, id: i64) -> Result<Account, ServiceError> {
        let account = self.store.get_account(id).await?;
        ensure_owner(owner, &account)?;
        Ok(account)
    }

    pub async fn list_accounts(
        &self,
        owner: &str,
        page: Page,
    ) -> Result<Vec<Account>, ServiceError> {
        let (limit, offset) = page.limit_offset()?;
        Ok(self
            .store
            .list_accounts(ListAccountsParams {
                owner: owner.to_string(),
                limit,
                offset,
            })
            .await?)
    }

    pub async fn list_entries(
        &self,
        owner: &str,
        account_id: i64,
        page: Page,
    ) -> Result<Vec<Entry>, ServiceError> {
        let (limit, offset) = page.limit_offset()?;
        self.get_account(owner, account_id).await?;
        Ok(self
            .store
            .list_entries(ListEntriesParams {
                account_id,
                limit,
                offset,
            })
            .await?)
    }

    /// Transfers where the account is either side
    pub async fn list_transfers(
        &self,
        owner: &str,
        account_id: i64,
        page: Page,
    ) -> Result<Vec<Transfer>, ServiceError> {
        let (limit, offset) = page.limit_offset()?;
        self.get_account(owner, account_id).await?;
        Ok(self
            .store
            .list_transfers(ListTransfersParams {
                from_account_id: account_id,
                to_account_id: account_id,
                limit,
                offset,
            })
            .await?)
    }

    // ------------------------------------------------------------------------
    // Transfers
    // ------------------------------------------------------------------------

    /// Check the source account (exists, currency, owner) and the destination
    /// (exists, currency), in that order, then run the transfer.
    pub async fn create_transfer(
        &self,
        owner: &str,
        req: TransferRequest,
    ) -> Result<TransferTxResult, ServiceError> {
        let from = self.account_in_currency(req.from_account_id, req.currency).await?;
        if from.owner != owner {
            return Err(ServiceError::Forbidden(format!(
                "you do not own account {}",
                req.from_account_id
            )));
        }
        self.account_in_currency(req.to_account_id, req.currency).await?;

        Ok(self
            .engine
            .transfer_tx(TransferTxParams::new(
                req.from_account_id,
                req.to_account_id,
                req.amount,
            ))
            .await?)
    }

    async fn account_in_currency(
        &self,
        id: i64,
        currency: Currency,
    ) -> Result<Account, ServiceError> {
        let account = self.store.get_account(id).await?;
        if account.currency != currency {
            return Err(ServiceError::CurrencyMismatch {
                account_id: id,
                expected: currency,
                actual: account.currency,
            });
        }
        Ok(account)
    }
}

fn ensure_owner(owner: &str, account: &Account) -> Result<(), ServiceError> {
    if account.owner != owner {
        return Err(ServiceError::Forbidden(
            "you do not own this account".to_string(),
        ));
    }
    Ok(())
}
