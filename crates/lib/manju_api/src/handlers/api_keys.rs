//! Vaulted API key handlers. All routes sit behind the auth guard and are
//! scoped to the caller: `{id}` must be the caller's own id.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use manju_core::models::vault::Credential;
use manju_core::vault::AddCredential;
use serde::Deserialize;
use uuid::Uuid;

use super::auth::MessageResponse;
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation(format!("invalid {what}")))
}

/// Parse `{id}` and require it to be the caller.
fn owner(user: &AuthenticatedUser, raw: &str) -> Result<Uuid, AppError> {
    let user_id = parse_id(raw, "user id")?;
    user.ensure_is(user_id)?;
    Ok(user_id)
}

/// `GET /users/{id}/api-keys`
pub async fn list_api_keys_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Credential>>> {
    let user_id = owner(&user, &id)?;
    Ok(Json(state.vault.list(user_id).await?))
}

/// `POST /users/{id}/api-keys`: 201 with the masked key.
pub async fn create_api_key_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    body: Result<Json<CreateApiKeyRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Credential>)> {
    let user_id = owner(&user, &id)?;
    let Json(body) = body.map_err(|e| AppError::Validation(e.body_text()))?;

    let credential = state
        .vault
        .add(
            user_id,
            AddCredential {
                label: body.label,
                provider: body.provider,
                secret: body.api_key,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(credential)))
}

/// `GET /users/{id}/api-keys/default`
pub async fn get_default_api_key_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> AppResult<Json<Credential>> {
    let user_id = owner(&user, &id)?;
    Ok(Json(state.vault.get_default(user_id).await?))
}

/// `DELETE /users/{id}/api-keys/{key_id}`: 204 whether or not anything was
/// removed.
pub async fn delete_api_key_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((id, key_id)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    let user_id = owner(&user, &id)?;
    let key_id = parse_id(&key_id, "key id")?;
    state.vault.delete(user_id, key_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /users/{id}/api-keys/{key_id}/default`
pub async fn set_default_api_key_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((id, key_id)): Path<(String, String)>,
) -> AppResult<Json<MessageResponse>> {
    let user_id = owner(&user, &id)?;
    let key_id = parse_id(&key_id, "key id")?;
    state.vault.set_default(user_id, key_id).await?;
    Ok(Json(MessageResponse {
        message: "default key updated".into(),
    }))
}
