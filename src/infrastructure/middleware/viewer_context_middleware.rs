// ViewerContext middleware - resolves the request's actor from its bearer token
// and injects it into request extensions for handlers

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::infrastructure::viewer::ViewerContext;

/// Header value schemes accepted for token authentication
const SCHEMES: [&str; 2] = ["Bearer ", "Token "];

pub async fn viewer_context_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let request_id = format!("req-{}", Uuid::new_v4());
    let viewer_context = match extract_token(request.headers())? {
        Some(token) => resolve_viewer(&state, token, request_id).await?,
        None => ViewerContext::anonymous(request_id),
    };

    debug!(
        request_id = %viewer_context.request_id,
        user_id = ?viewer_context.user_id(),
        "resolved viewer"
    );
    request.extensions_mut().insert(Arc::new(viewer_context));

    Ok(next.run(request).await)
}

/// Token from the Authorization header. An absent header means anonymous; a
/// present but unusable one is rejected.
fn extract_token(headers: &HeaderMap) -> AppResult<Option<&str>> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid token header.".to_string()))?;

    SCHEMES
        .iter()
        .find_map(|scheme| value.strip_prefix(scheme))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(Some)
        .ok_or_else(|| AppError::Unauthorized("Invalid token header.".to_string()))
}

async fn resolve_viewer(
    state: &AppState,
    token: &str,
    request_id: String,
) -> AppResult<ViewerContext> {
    let claims = state.security.validate_token(token)?;
    let user_id = claims.user_id()?;

    match state.store.find_user(user_id).await? {
        Some(user) => Ok(ViewerContext::authenticated(user, request_id)),
        None => {
            warn!("Token for missing user {} rejected", user_id);
            Err(AppError::Unauthorized(
                "User inactive or deleted.".to_string(),
            ))
        }
    }
}
