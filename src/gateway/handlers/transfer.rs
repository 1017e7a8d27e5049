//! Transfer handler

use std::sync::Arc;

use axum::{Extension, extract::State};

use super::super::state::AppState;
use super::super::types::{ApiResult, TransferRequestBody, ValidatedJson, ok};
use crate::service::TransferRequest;
use crate::transfer::TransferTxResult;
use crate::user_auth::Payload;

/// POST /api/v1/transfers
///
/// Moves `amount` between two accounts of the same `currency`. The caller must
/// own the source account.
pub async fn create_transfer(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<Payload>,
    ValidatedJson(req): ValidatedJson<TransferRequestBody>,
) -> ApiResult<TransferTxResult> {
    let currency = req.currency()?;
    tracing::debug!(
        owner = %auth.subject,
        from = req.from_account_id,
        to = req.to_account_id,
        amount = req.amount,
        "Transfer requested"
    );

    let result = state
        .service
        .create_transfer(
            &auth.subject,
            TransferRequest {
                from_account_id: req.from_account_id,
                to_account_id: req.to_account_id,
                amount: req.amount,
                currency,
            },
        )
        .await?;
    ok(result)
}
