use axum::{
    extract::{Path, State},
    Json,
};
use parley_core::AppState;
use parley_models::user::Profile;

use crate::error::ApiError;
use crate::middleware::AuthUser;

/// Profile with age, horoscope and zodiac derived from the birthday as of today.
pub async fn get_profile(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Json<Profile>, ApiError> {
    let today = chrono::Utc::now().date_naive();
    let profile = parley_core::users::get_profile(&state.db, user_id, today).await?;
    Ok(Json(profile))
}
