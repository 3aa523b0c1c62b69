use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::auth::{authenticate, Role};
use crate::errors::AppError;
use crate::extract::ValidateJson;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Please enter a valid email."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub role: Role,
    pub redirect_to: &'static str,
}

/// POST /api/v1/auth/login
pub async fn handle_login(
    ValidateJson(req): ValidateJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let role = authenticate(&req.email, &req.password)?;
    info!("Login succeeded for role {role:?}");

    Ok(Json(LoginResponse {
        role,
        redirect_to: role.landing_page(),
    }))
}
