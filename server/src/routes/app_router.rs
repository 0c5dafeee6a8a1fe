use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    BoxError, Json, Router,
};
use http::HeaderValue;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::{error::AppError, request_tracing, server_config::cfg, ServerState};

use super::handlers::{accounts, auth, emails, preferences};

/// Upper bound for a whole request; a manual sync of a full page is the slow case.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct AppRouter;

impl AppRouter {
    pub fn create(state: ServerState) -> Router {
        let origins = cfg
            .frontend
            .allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin {}", origin);
                    None
                }
            })
            .collect::<Vec<_>>();

        let cors_layer = CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true);

        let api = Router::new()
            .route("/auth/me", get(auth::handler_me))
            .route("/accounts", get(accounts::list_accounts))
            .route("/accounts/connect", post(accounts::connect))
            .route("/accounts/callback", get(accounts::callback))
            .route("/accounts/:account_id", delete(accounts::disconnect))
            .route("/accounts/:account_id/sync", post(accounts::sync_account))
            .route("/emails", get(emails::list_emails))
            .route("/emails/priority", get(emails::priority_emails))
            .route(
                "/emails/preferences/me",
                get(preferences::get_preferences).put(preferences::update_preferences),
            )
            .route("/emails/:email_id", get(emails::get_email))
            .route("/emails/:email_id/feedback", post(emails::submit_feedback));

        Router::new()
            .route(
                "/",
                get(|| async { Json(json!({"message": "Trackmail API", "version": "1.0.0"})) }),
            )
            .route("/health", get(|| async { Json(json!({"status": "healthy"})) }))
            .nest("/api", api)
            .fallback(handler_404)
            .layer(
                ServiceBuilder::new()
                    .layer(HandleErrorLayer::new(handle_timeout_error))
                    .timeout(REQUEST_TIMEOUT),
            )
            .layer(request_tracing::trace_with_request_id_layer())
            .layer(cors_layer)
            .with_state(state)
    }
}

async fn handle_timeout_error(err: BoxError) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        AppError::RequestTimeout
    } else {
        AppError::Internal(anyhow::anyhow!("Unhandled middleware error: {err}"))
    }
}

pub async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Route does not exist")
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::Request,
        response::Response,
    };
    use sea_orm::{DatabaseBackend, MockDatabase};
    use serde_json::json;
    use tower::ServiceExt;
    use uuid::Uuid;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::testing::common::{
        account_model, bearer_token, gmail_config, test_server_state,
        test_server_state_with_gmail, use_test_encryption_key,
    };

    fn empty_db() -> sea_orm::DatabaseConnection {
        MockDatabase::new(DatabaseBackend::Postgres).into_connection()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn authed_get(uri: &str, user_id: Uuid) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("authorization", format!("Bearer {}", bearer_token(user_id)))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let router = AppRouter::create(test_server_state(empty_db()));
        let response = router.oneshot(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let router = AppRouter::create(test_server_state(empty_db()));
        let response = router.oneshot(get("/api/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_bearer_is_unauthorized() {
        let router = AppRouter::create(test_server_state(empty_db()));
        let response = router.oneshot(get("/api/accounts")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["code"], 401);
    }

    #[tokio::test]
    async fn test_me_echoes_claims() {
        let user_id = Uuid::new_v4();
        let router = AppRouter::create(test_server_state(empty_db()));
        let request = Request::builder()
            .uri("/api/auth/me")
            .header("authorization", format!("Bearer {}", bearer_token(user_id)))
            .body(Body::empty())
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["id"], user_id.to_string());
    }

    #[tokio::test]
    async fn test_accounts_listing_hides_tokens() {
        let user_id = Uuid::new_v4();
        let conn = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![account_model(user_id, "ada@example.com")]])
            .into_connection();
        let router = AppRouter::create(test_server_state(conn));
        let request = Request::builder()
            .uri("/api/accounts")
            .header("authorization", format!("Bearer {}", bearer_token(user_id)))
            .body(Body::empty())
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body[0]["email_address"], "ada@example.com");
        assert!(body[0].get("access_token").is_none());
        assert!(body[0].get("refresh_token").is_none());
    }

    #[tokio::test]
    async fn test_connect_returns_consent_url() {
        let user_id = Uuid::new_v4();
        let state = test_server_state(empty_db());
        let router = AppRouter::create(state.clone());
        let request = Request::builder()
            .method("POST")
            .uri("/api/accounts/connect")
            .header("authorization", format!("Bearer {}", bearer_token(user_id)))
            .body(Body::empty())
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let auth_url = url::Url::parse(body["auth_url"].as_str().unwrap()).unwrap();
        let issued = auth_url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(state.oauth_states.take(&issued), Some(user_id));
    }

    #[tokio::test]
    async fn test_callback_with_unknown_state_is_bad_request() {
        let router = AppRouter::create(test_server_state(empty_db()));
        let response = router
            .oneshot(get("/api/accounts/callback?code=abc&state=forged"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_callback_denied_redirects_with_error() {
        let state = test_server_state(empty_db());
        let issued = state.oauth_states.issue(Uuid::new_v4());
        let router = AppRouter::create(state.clone());

        let response = router
            .oneshot(get(&format!(
                "/api/accounts/callback?state={issued}&error=access_denied"
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()["location"].to_str().unwrap();
        assert!(location.starts_with("http://localhost:3000/dashboard?"));
        assert!(location.contains("error=access_denied"));
        // single use
        assert_eq!(state.oauth_states.take(&issued), None);
    }

    #[tokio::test]
    async fn test_empty_preferences_update_is_rejected() {
        let router = AppRouter::create(test_server_state(empty_db()));
        let request = Request::builder()
            .method("PUT")
            .uri("/api/emails/preferences/me")
            .header(
                "authorization",
                format!("Bearer {}", bearer_token(Uuid::new_v4())),
            )
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"]["message"],
            "No fields to update"
        );
    }

    #[tokio::test]
    async fn test_malformed_query_is_json_bad_request() {
        let router = AppRouter::create(test_server_state(empty_db()));
        let response = router
            .oneshot(authed_get("/api/emails?limit=abc", Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], 400);
        assert!(body["error"]["message"].is_string());
    }

    #[tokio::test]
    async fn test_malformed_path_is_json_bad_request() {
        let router = AppRouter::create(test_server_state(empty_db()));
        let response = router
            .oneshot(authed_get("/api/emails/not-a-uuid", Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], 400);
    }

    #[tokio::test]
    async fn test_malformed_feedback_body_is_json_error() {
        let router = AppRouter::create(test_server_state(empty_db()));
        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/emails/{}/feedback", Uuid::new_v4()))
            .header(
                "authorization",
                format!("Bearer {}", bearer_token(Uuid::new_v4())),
            )
            .header("content-type", "application/json")
            .body(Body::from("{\"is_correct\": \"maybe\"}"))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], 400);
    }

    #[tokio::test]
    async fn test_callback_connects_account_and_redirects() {
        use_test_encryption_key();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.granted",
                "refresh_token": "1//granted-refresh",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/profile"))
            .and(header("authorization", "Bearer ya29.granted"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "emailAddress": "ada@example.com",
                "messagesTotal": 12
            })))
            .expect(1)
            .mount(&server)
            .await;

        let user_id = Uuid::new_v4();
        let conn = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![account_model(user_id, "ada@example.com")]])
            .into_connection();
        let state = test_server_state_with_gmail(conn.clone(), gmail_config(&server.uri()));
        let issued = state.oauth_states.issue(user_id);
        let router = AppRouter::create(state);

        let response = router
            .oneshot(get(&format!(
                "/api/accounts/callback?code=auth-code&state={issued}"
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()["location"].to_str().unwrap();
        assert!(location.starts_with("http://localhost:3000/dashboard?"));
        assert!(location.contains("connected=true"));

        let log = format!("{:?}", conn.into_transaction_log());
        assert!(log.contains("INSERT INTO"));
        assert!(log.contains("ON CONFLICT"));
        assert!(!log.contains("ya29.granted"));
    }
}
