//! User authentication
//!
//! - [`token`]: bearer access tokens ([`TokenMaker`], [`JwtMaker`])
//! - [`password`]: argon2 password hashing
//! - [`middleware`]: axum bearer-token middleware for the gateway

pub mod middleware;
pub mod password;
pub mod token;

pub use middleware::jwt_auth_middleware;
pub use password::{PasswordError, hash_password, verify_password};
pub use token::{JwtMaker, Payload, PayloadParams, TokenError, TokenMaker};
