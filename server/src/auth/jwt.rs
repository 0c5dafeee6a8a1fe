//! Bearer-token validation for tokens issued by the external auth provider.
//!
//! Tokens are HS256-signed with the provider's shared `JWT_SECRET`; the
//! `sub` claim carries the user id.

use std::sync::LazyLock;

use axum::{async_trait, extract::FromRequestParts, RequestPartsExt};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, server_config::cfg};

static KEYS: LazyLock<Option<Keys>> =
    LazyLock::new(|| std::env::var("JWT_SECRET").ok().map(|secret| Keys::new(&secret)));

pub struct Keys {
    decoding: DecodingKey,
}

impl Keys {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub aud: Option<String>,
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Uuid {
        self.sub
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingCredentials,
    InvalidToken,
}

pub fn decode_claims(token: &str, keys: &Keys, audience: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[audience]);
    validation.leeway = 30;

    jsonwebtoken::decode::<Claims>(token, &keys.decoding, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::warn!("Error decoding token: {:?}", e);
            AuthError::InvalidToken
        })
}

#[async_trait]
impl<S> FromRequestParts<S> for Claims
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Extract the token from the authorization header
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::MissingCredentials)?;

        let keys = KEYS
            .as_ref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("JWT_SECRET is not set")))?;

        Ok(decode_claims(bearer.token(), keys, &cfg.auth.audience)?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;

    use super::*;

    const SECRET: &str = "test-secret";

    fn sign(claims: serde_json::Value, secret: &str) -> String {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_decode_valid_token() {
        let user_id = Uuid::new_v4();
        let token = sign(
            json!({
                "sub": user_id,
                "email": "ada@example.com",
                "aud": "authenticated",
                "exp": Utc::now().timestamp() + 600,
            }),
            SECRET,
        );

        let claims = decode_claims(&token, &Keys::new(SECRET), "authenticated").unwrap();
        assert_eq!(claims.user_id(), user_id);
        assert_eq!(claims.email.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn test_decode_rejects_expired_token() {
        let token = sign(
            json!({
                "sub": Uuid::new_v4(),
                "aud": "authenticated",
                "exp": Utc::now().timestamp() - 3600,
            }),
            SECRET,
        );

        assert!(matches!(
            decode_claims(&token, &Keys::new(SECRET), "authenticated"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_secret_and_audience() {
        let claims = json!({
            "sub": Uuid::new_v4(),
            "aud": "authenticated",
            "exp": Utc::now().timestamp() + 600,
        });

        let forged = sign(claims.clone(), "other-secret");
        assert!(decode_claims(&forged, &Keys::new(SECRET), "authenticated").is_err());

        let token = sign(claims, SECRET);
        assert!(decode_claims(&token, &Keys::new(SECRET), "service_role").is_err());
    }
}
