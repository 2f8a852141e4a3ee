use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, warn};

use crate::error::AuthError;
use crate::models::ErrorResponse;
use crate::services::auth_service::{authenticate, get_auth_token};
use crate::state::AppState;

/// Validate the bearer token or `auth_token` cookie and expose the caller's
/// `Identity` to downstream handlers as a request extension.
pub async fn auth_middleware(State(app_state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    let token = match get_auth_token(&req) {
        Ok(token) => token,
        Err(e) => {
            warn!("Rejected request without credentials: {}", e);
            return unauthorized(e);
        }
    };

    match authenticate(&token, app_state.config.cloud_auth_jwt_secret.as_deref()) {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(AuthError::MissingSecret) => {
            error!("Cloud auth JWT secret not configured");
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            (
                status,
                Json(ErrorResponse {
                    code: status.as_u16(),
                    status: "error".to_string(),
                    error: AuthError::MissingSecret.to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            warn!("JWT validation failed: {}", e);
            unauthorized(e.to_string())
        }
    }
}

fn unauthorized(message: String) -> Response {
    let status = StatusCode::UNAUTHORIZED;
    (
        status,
        Json(ErrorResponse {
            code: status.as_u16(),
            status: "error".to_string(),
            error: message,
        }),
    )
        .into_response()
}
