//! User registration and login

use std::sync::Arc;

use axum::extract::State;

use super::super::state::AppState;
use super::super::types::{ApiResult, CreateUserRequest, LoginUserRequest, ValidatedJson, ok};
use crate::service::{LoginResponse, NewUser, UserView};

/// POST /api/v1/users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> ApiResult<UserView> {
    let user = state
        .service
        .create_user(NewUser {
            username: req.username,
            password: req.password,
            full_name: req.full_name,
            email: req.email,
        })
        .await?;
    ok(user)
}

/// POST /api/v1/users/login
pub async fn login_user(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<LoginUserRequest>,
) -> ApiResult<LoginResponse> {
    ok(state.service.login_user(&req.username, &req.password).await?)
}
