//! Request DTOs and validating extractors
//!
//! Bodies, query strings and path segments are deserialized and then checked
//! with `validator` rules before a handler sees them. Any failure is a 400
//! with [`error_codes::INVALID_PARAMETER`](super::error_codes::INVALID_PARAMETER).

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
};
use serde::{Deserialize, de::DeserializeOwned};
use validator::{Validate, ValidationError};

use super::response::ApiError;
use crate::service::Page;
use crate::store::Currency;

fn validate_alphanumeric(value: &str) -> Result<(), ValidationError> {
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(ValidationError::new("alphanum"))
    }
}

fn validate_currency(value: &str) -> Result<(), ValidationError> {
    if Currency::is_supported(value) {
        Ok(())
    } else {
        Err(ValidationError::new("currency"))
    }
}

fn parse_currency(value: &str) -> Result<Currency, ApiError> {
    value
        .parse()
        .map_err(|e: crate::store::models::UnsupportedCurrency| {
            ApiError::bad_request(e.to_string())
        })
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(custom(function = "validate_alphanumeric"))]
    pub username: String,
    #[validate(length(min = 6))]
    pub password: String,
    #[validate(length(min = 6))]
    pub full_name: String,
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginUserRequest {
    #[validate(custom(function = "validate_alphanumeric"))]
    pub username: String,
    #[validate(length(min = 6))]
    pub password: String,
}

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAccountRequest {
    #[validate(custom(function = "validate_currency"))]
    pub currency: String,
}

impl CreateAccountRequest {
    pub fn currency(&self) -> Result<Currency, ApiError> {
        parse_currency(&self.currency)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AccountIdPath {
    #[validate(range(min = 1))]
    pub id: i64,
}

#[derive(Debug, Clone, Copy, Deserialize, Validate)]
pub struct PageQuery {
    #[validate(range(min = 1, max = 2147483647))]
    pub page_id: i64,
    #[validate(range(min = 5, max = 10))]
    pub page_size: i64,
}

impl From<PageQuery> for Page {
    fn from(q: PageQuery) -> Self {
        Page {
            page_id: q.page_id,
            page_size: q.page_size,
        }
    }
}

// ============================================================================
// Transfers
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct TransferRequestBody {
    #[validate(range(min = 1))]
    pub from_account_id: i64,
    #[validate(range(min = 1))]
    pub to_account_id: i64,
    #[validate(range(min = 1))]
    pub amount: i64,
    #[validate(custom(function = "validate_currency"))]
    pub currency: String,
}

impl TransferRequestBody {
    pub fn currency(&self) -> Result<Currency, ApiError> {
        parse_currency(&self.currency)
    }
}

// ============================================================================
// Extractors
// ============================================================================

/// JSON body that passed `validator` rules
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value): Json<T> = Json::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e.body_text())))?;
        value
            .validate()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        Ok(Self(value))
    }
}

/// Query string that passed `validator` rules
pub struct ValidatedQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value): Query<T> = Query::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        value
            .validate()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        Ok(Self(value))
    }
}

/// Path parameters that passed `validator` rules
pub struct ValidatedPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidatedPath<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate + Send,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value): Path<T> = Path::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        value
            .validate()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        Ok(Self(value))
    }
}
