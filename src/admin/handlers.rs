use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::request::Parts,
    routing::{delete, get, put},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{dto::PublicUser, jwt::CurrentUser, repo::User},
    error::{ApiError, ApiResponse, Result},
    state::AppState,
};

use super::dto::{Pagination, SetTierRequest};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id", get(get_user))
        .route("/admin/users/:id/tier", put(set_tier))
        .route("/admin/users/:id", delete(delete_user))
}

/// Admin guard on top of the bearer-token guard.
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            warn!(user_id = %user.id, "admin route refused");
            return Err(ApiError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(p): Query<Pagination>,
) -> Result<Json<ApiResponse<Vec<PublicUser>>>> {
    let users = User::list(&state.db, p.limit.clamp(1, 200), p.offset.max(0)).await?;
    Ok(ApiResponse::ok(users.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state, _admin))]
pub async fn get_user(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PublicUser>>> {
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(ApiResponse::ok(user.into()))
}

#[instrument(skip(state, admin, payload))]
pub async fn set_tier(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetTierRequest>,
) -> Result<Json<ApiResponse<PublicUser>>> {
    let user = User::set_tier(&state.db, id, payload.tier, payload.expires_at)
        .await?
        .ok_or(ApiError::NotFound)?;
    info!(admin_id = %admin.id, user_id = %user.id, tier = ?payload.tier, "tier updated");
    Ok(ApiResponse::ok(user.into()))
}

/// Deletes the user and every outstanding code for that email in one
/// transaction.
#[instrument(skip(state, admin))]
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>> {
    let (email, purged) = User::delete_cascading(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    info!(admin_id = %admin.id, user_id = %id, %email, purged, "user deleted");
    Ok(ApiResponse::ok(serde_json::json!({ "deleted": id })))
}
