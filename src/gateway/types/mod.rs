//! Gateway types module
//!
//! ## Input Types
//! - [`ValidatedJson`], [`ValidatedQuery`], [`ValidatedPath`]: axum extractors running
//!   `validator` rules
//! - Request DTOs for users, accounts and transfers
//!
//! ## Output Types
//! - [`ApiResponse<T>`]: Unified API response wrapper
//! - [`ApiError`]: Error rendered as an `ApiResponse`

pub mod request;
pub mod response;

pub use request::{
    AccountIdPath, CreateAccountRequest, CreateUserRequest, LoginUserRequest, PageQuery,
    TransferRequestBody, ValidatedJson, ValidatedPath, ValidatedQuery,
};
pub use response::{ApiError, ApiResponse, ApiResult, error_codes, ok};
