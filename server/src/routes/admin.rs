use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use tracing::warn;

use crate::error::FetchError;
use crate::services::refresh;
use crate::state::AppState;

/// Manual re-trigger of the refresh cycle, and the only way to retry
/// before the next scheduled run.
pub async fn trigger_refresh(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match refresh::refresh_once(&state).await {
        Ok(entries) => {
            let seq = state.live_snapshot.read().await.seq;
            Ok(Json(serde_json::json!({
                "status": "ok",
                "entries": entries,
                "seq": seq,
            })))
        }
        Err(e) => {
            let status = match e {
                FetchError::MissingCredential => StatusCode::SERVICE_UNAVAILABLE,
                FetchError::Network { .. } | FetchError::Api { .. } | FetchError::EmptyResult { .. } => {
                    StatusCode::BAD_GATEWAY
                }
            };
            Err((
                status,
                Json(serde_json::json!({
                    "status": "error",
                    "message": e.to_string(),
                })),
            ))
        }
    }
}

#[derive(Deserialize)]
pub struct TokenBody {
    token: String,
}

pub async fn get_token(State(state): State<AppState>) -> Json<serde_json::Value> {
    let token = state.api_token.read().await.clone();
    Json(serde_json::json!({ "token": token }))
}

/// Replace the upstream API credential, persisting it when a store is
/// configured. A blank token is rejected rather than stored.
pub async fn put_token(
    State(state): State<AppState>,
    Json(body): Json<TokenBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let token = body.token.trim().to_string();
    if token.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    if let Some(store) = state.store.as_ref()
        && let Err(e) = store.save_api_token(&token).await
    {
        warn!("failed to persist API token: {e}");
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    *state.api_token.write().await = Some(token);
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::Router;
    use axum::http::HeaderMap;

    use crate::config::SCOREBOARD_TOP_N;
    use crate::state::AppState;

    async fn spawn_test_server(state: AppState) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let app = crate::app::build_app(state);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test app");
        });
        (addr, handle)
    }

    async fn spawn_mock_upstream() -> (SocketAddr, tokio::task::JoinHandle<()>) {
        fn body_for(headers: &HeaderMap, body: &'static str) -> String {
            let authorized = headers
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                == Some("Token secret");
            if authorized {
                body.to_string()
            } else {
                r#"{"success": false, "message": "unauthorized"}"#.to_string()
            }
        }

        let app = Router::new()
            .route(
                "/api/v1/users",
                axum::routing::get(|headers: HeaderMap| async move {
                    body_for(
                        &headers,
                        r#"{"success": true, "data": [{"name": "alice"}, {"name": "bob"}]}"#,
                    )
                }),
            )
            .route(
                &format!("/api/v1/scoreboard/top/{SCOREBOARD_TOP_N}"),
                axum::routing::get(|headers: HeaderMap| async move {
                    body_for(
                        &headers,
                        r#"{"success": true, "data": [{"name": "bob", "score": 50}]}"#,
                    )
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock upstream");
        let addr = listener.local_addr().expect("mock upstream address");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve mock upstream");
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn token_put_trims_and_round_trips() {
        let state = AppState::new(None);
        let (addr, server_handle) = spawn_test_server(state).await;
        let base_url = format!("http://{addr}");
        let client = reqwest::Client::new();

        let absent = client
            .get(format!("{base_url}/api/admin/token"))
            .send()
            .await
            .expect("token request")
            .json::<serde_json::Value>()
            .await
            .expect("parse token response");
        assert!(absent.get("token").is_some_and(|token| token.is_null()));

        client
            .put(format!("{base_url}/api/admin/token"))
            .json(&serde_json::json!({"token": "  secret  "}))
            .send()
            .await
            .expect("token update request")
            .error_for_status()
            .expect("token update status");

        let stored = client
            .get(format!("{base_url}/api/admin/token"))
            .send()
            .await
            .expect("token request")
            .json::<serde_json::Value>()
            .await
            .expect("parse token response");
        assert_eq!(
            stored.get("token").and_then(|token| token.as_str()),
            Some("secret")
        );

        server_handle.abort();
        let _ = server_handle.await;
    }

    #[tokio::test]
    async fn blank_token_is_rejected() {
        let state = AppState::new(None);
        let (addr, server_handle) = spawn_test_server(state).await;
        let base_url = format!("http://{addr}");

        let response = reqwest::Client::new()
            .put(format!("{base_url}/api/admin/token"))
            .json(&serde_json::json!({"token": "   "}))
            .send()
            .await
            .expect("token update request");
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

        server_handle.abort();
        let _ = server_handle.await;
    }

    #[tokio::test]
    async fn refresh_without_credential_maps_to_service_unavailable() {
        let state = AppState::new(None);
        let (addr, server_handle) = spawn_test_server(state).await;
        let base_url = format!("http://{addr}");

        let response = reqwest::Client::new()
            .post(format!("{base_url}/api/admin/refresh"))
            .send()
            .await
            .expect("refresh request");
        assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
        let body = response
            .json::<serde_json::Value>()
            .await
            .expect("parse refresh error");
        assert_eq!(
            body.get("status").and_then(|status| status.as_str()),
            Some("error")
        );
        assert!(
            body.get("message")
                .and_then(|message| message.as_str())
                .is_some_and(|message| message.contains("token"))
        );

        server_handle.abort();
        let _ = server_handle.await;
    }

    #[tokio::test]
    async fn refresh_endpoint_publishes_through_the_full_surface() {
        let (upstream_addr, upstream_handle) = spawn_mock_upstream().await;
        let mut state = AppState::new(None);
        state.ctfd_base_url = format!("http://{upstream_addr}");
        let (addr, server_handle) = spawn_test_server(state).await;
        let base_url = format!("http://{addr}");
        let client = reqwest::Client::new();

        client
            .put(format!("{base_url}/api/admin/token"))
            .json(&serde_json::json!({"token": "secret"}))
            .send()
            .await
            .expect("token update request")
            .error_for_status()
            .expect("token update status");

        let refreshed = client
            .post(format!("{base_url}/api/admin/refresh"))
            .send()
            .await
            .expect("refresh request")
            .error_for_status()
            .expect("refresh status")
            .json::<serde_json::Value>()
            .await
            .expect("parse refresh response");
        assert_eq!(
            refreshed.get("status").and_then(|status| status.as_str()),
            Some("ok")
        );
        assert_eq!(
            refreshed.get("entries").and_then(|entries| entries.as_u64()),
            Some(2)
        );
        assert_eq!(refreshed.get("seq").and_then(|seq| seq.as_u64()), Some(1));

        let table = client
            .get(format!("{base_url}/api/leaderboard"))
            .send()
            .await
            .expect("leaderboard request")
            .error_for_status()
            .expect("leaderboard status")
            .text()
            .await
            .expect("read leaderboard body");
        assert!(table.contains("<tr><td>1</td><td>bob</td><td>50</td><td>1</td></tr>"));
        assert!(table.contains("<tr><td>2</td><td>alice</td><td>unranked</td><td>2</td></tr>"));

        upstream_handle.abort();
        server_handle.abort();
        let _ = server_handle.await;
    }

    #[tokio::test]
    async fn upstream_rejection_maps_to_bad_gateway() {
        let (upstream_addr, upstream_handle) = spawn_mock_upstream().await;
        let mut state = AppState::new(None);
        state.ctfd_base_url = format!("http://{upstream_addr}");
        let (addr, server_handle) = spawn_test_server(state).await;
        let base_url = format!("http://{addr}");
        let client = reqwest::Client::new();

        client
            .put(format!("{base_url}/api/admin/token"))
            .json(&serde_json::json!({"token": "wrong"}))
            .send()
            .await
            .expect("token update request")
            .error_for_status()
            .expect("token update status");

        let response = client
            .post(format!("{base_url}/api/admin/refresh"))
            .send()
            .await
            .expect("refresh request");
        assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);

        upstream_handle.abort();
        server_handle.abort();
        let _ = server_handle.await;
    }
}
