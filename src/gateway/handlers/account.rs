//! Account handlers
//!
//! All routes here sit behind the bearer-token middleware; the token subject
//! is the account owner.

use std::sync::Arc;

use axum::{Extension, extract::State};

use super::super::state::AppState;
use super::super::types::{
    AccountIdPath, ApiResult, CreateAccountRequest, PageQuery, ValidatedJson, ValidatedPath,
    ValidatedQuery, ok,
};
use crate::store::{Account, Entry, Transfer};
use crate::user_auth::Payload;

/// POST /api/v1/accounts
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<Payload>,
    ValidatedJson(req): ValidatedJson<CreateAccountRequest>,
) -> ApiResult<Account> {
    let currency = req.currency()?;
    ok(state.service.create_account(&auth.subject, currency).await?)
}

/// GET /api/v1/accounts/{id}
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<Payload>,
    ValidatedPath(path): ValidatedPath<AccountIdPath>,
) -> ApiResult<Account> {
    ok(state.service.get_account(&auth.subject, path.id).await?)
}

/// GET /api/v1/accounts?page_id=&page_size=
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<Payload>,
    ValidatedQuery(page): ValidatedQuery<PageQuery>,
) -> ApiResult<Vec<Account>> {
    ok(state.service.list_accounts(&auth.subject, page.into()).await?)
}

/// GET /api/v1/accounts/{id}/entries?page_id=&page_size=
pub async fn list_account_entries(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<Payload>,
    ValidatedPath(path): ValidatedPath<AccountIdPath>,
    ValidatedQuery(page): ValidatedQuery<PageQuery>,
) -> ApiResult<Vec<Entry>> {
    ok(state
        .service
        .list_entries(&auth.subject, path.id, page.into())
        .await?)
}

/// GET /api/v1/accounts/{id}/transfers?page_id=&page_size=
pub async fn list_account_transfers(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<Payload>,
    ValidatedPath(path): ValidatedPath<AccountIdPath>,
    ValidatedQuery(page): ValidatedQuery<PageQuery>,
) -> ApiResult<Vec<Transfer>> {
    ok(state
        .service
        .list_transfers(&auth.subject, path.id, page.into())
        .await?)
}
