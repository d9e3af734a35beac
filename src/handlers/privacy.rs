use axum::{body::Bytes, extract::State, response::IntoResponse, Json};
use tracing::instrument;

use crate::app_state::AppState;
use crate::entities::{PrivacySettings, PrivacySettingsUpdate};
use crate::error::AppResult;
use crate::handlers::parse_body;
use crate::infrastructure::Vc;
use crate::permissions::{check, AUTHENTICATED};

async fn current_settings(state: &AppState, user_id: i64) -> AppResult<PrivacySettings> {
    Ok(state
        .store
        .privacy_settings(user_id)
        .await?
        .unwrap_or_else(|| PrivacySettings::defaults_for(user_id)))
}

#[instrument(skip(state, vc), fields(request_id = %vc.request_id))]
pub async fn get_privacy_settings(
    State(state): State<AppState>,
    vc: Vc,
) -> AppResult<impl IntoResponse> {
    check(&vc, AUTHENTICATED)?;
    let actor = vc.require_user()?;
    Ok(Json(current_settings(&state, actor.id).await?))
}

#[instrument(skip(state, vc, body), fields(request_id = %vc.request_id))]
pub async fn update_privacy_settings(
    State(state): State<AppState>,
    vc: Vc,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    check(&vc, AUTHENTICATED)?;
    let actor = vc.require_user()?;
    let update: PrivacySettingsUpdate = parse_body(&body)?;

    let settings = update.apply(current_settings(&state, actor.id).await?)?;
    state.store.save_privacy_settings(&settings).await?;
    Ok(Json(settings))
}
