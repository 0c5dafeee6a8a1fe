use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::jwt::Claims;

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: Option<String>,
}

pub async fn handler_me(claims: Claims) -> Json<MeResponse> {
    Json(MeResponse {
        id: claims.user_id(),
        email: claims.email,
    })
}
