use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use sea_orm::EntityTrait;

use crate::entities;
use crate::http_server::state::AppState;

/// The authenticated caller. Identity comes from the session layer in front
/// of this service via the `x-user-id` header; the core trusts the value
/// and only checks that the user exists.
pub struct CurrentUser(pub entities::user::Model);

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_id: i64 = parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Missing or invalid x-user-id header".to_string(),
            ))?;

        let user = entities::user::Entity::find_by_id(user_id)
            .one(&state.db.conn)
            .await
            .map_err(|error| {
                log::error!("Failed to load user {user_id}: {error}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong".to_string(),
                )
            })?
            .ok_or((StatusCode::UNAUTHORIZED, "Unknown user".to_string()))?;

        Ok(CurrentUser(user))
    }
}
