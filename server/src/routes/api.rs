use std::fmt::Write as _;

use axum::Json;
use axum::extract::State;
use axum::http::header;

use crate::state::{AppState, ObservabilitySnapshot};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (entries, seq, fetched_at) = {
        let snapshot = state.live_snapshot.read().await;
        (
            snapshot.entries.len(),
            snapshot.seq,
            snapshot.fetched_at.clone(),
        )
    };
    let credential_configured = state.api_token.read().await.is_some();
    let observability = state.observability.snapshot();

    Json(serde_json::json!({
        "status": "ok",
        "entries": entries,
        "seq": seq,
        "fetched_at": fetched_at,
        "credential_configured": credential_configured,
        "store_available": state.store.is_some(),
        "observability": {
            "leaderboard_requests_total": observability.leaderboard_requests_total,
            "refresh_success_total": observability.refresh_success_total,
            "refresh_failures_total": observability.refresh_failures_total,
            "persist_failures_total": observability.persist_failures_total,
            "snapshot_restored": observability.snapshot_restored,
        }
    }))
}

pub async fn metrics(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    let entries = state.live_snapshot.read().await.entries.len();
    let credential_configured = state.api_token.read().await.is_some();
    let store_available = state.store.is_some();
    let observability = state.observability.snapshot();

    let body = render_prometheus_metrics(
        entries,
        credential_configured,
        store_available,
        observability,
    );

    (
        [
            (header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
}

fn render_prometheus_metrics(
    entries: usize,
    credential_configured: bool,
    store_available: bool,
    observability: ObservabilitySnapshot,
) -> String {
    let mut body = String::new();
    let _ = writeln!(
        body,
        "# HELP podium_leaderboard_entries Current number of entries in the published leaderboard."
    );
    let _ = writeln!(body, "# TYPE podium_leaderboard_entries gauge");
    let _ = writeln!(body, "podium_leaderboard_entries {entries}");

    let _ = writeln!(
        body,
        "# HELP podium_credential_configured Whether an upstream API token is configured (1 or 0)."
    );
    let _ = writeln!(body, "# TYPE podium_credential_configured gauge");
    let _ = writeln!(
        body,
        "podium_credential_configured {}",
        u8::from(credential_configured)
    );

    let _ = writeln!(
        body,
        "# HELP podium_store_available Whether settings persistence is available (1 or 0)."
    );
    let _ = writeln!(body, "# TYPE podium_store_available gauge");
    let _ = writeln!(body, "podium_store_available {}", u8::from(store_available));

    let _ = writeln!(
        body,
        "# HELP podium_snapshot_restored Whether a persisted snapshot was restored at boot (1 or 0)."
    );
    let _ = writeln!(body, "# TYPE podium_snapshot_restored gauge");
    let _ = writeln!(
        body,
        "podium_snapshot_restored {}",
        observability.snapshot_restored
    );

    let _ = writeln!(
        body,
        "# HELP podium_leaderboard_requests_total Total leaderboard read requests."
    );
    let _ = writeln!(body, "# TYPE podium_leaderboard_requests_total counter");
    let _ = writeln!(
        body,
        "podium_leaderboard_requests_total {}",
        observability.leaderboard_requests_total
    );

    let _ = writeln!(
        body,
        "# HELP podium_refresh_success_total Total refresh cycles that published a snapshot."
    );
    let _ = writeln!(body, "# TYPE podium_refresh_success_total counter");
    let _ = writeln!(
        body,
        "podium_refresh_success_total {}",
        observability.refresh_success_total
    );

    let _ = writeln!(
        body,
        "# HELP podium_refresh_failures_total Total refresh cycles that failed."
    );
    let _ = writeln!(body, "# TYPE podium_refresh_failures_total counter");
    let _ = writeln!(
        body,
        "podium_refresh_failures_total {}",
        observability.refresh_failures_total
    );

    let _ = writeln!(
        body,
        "# HELP podium_persist_failures_total Total failures while persisting a snapshot."
    );
    let _ = writeln!(body, "# TYPE podium_persist_failures_total counter");
    let _ = writeln!(
        body,
        "podium_persist_failures_total {}",
        observability.persist_failures_total
    );

    body
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::render_prometheus_metrics;
    use crate::state::{AppState, ObservabilitySnapshot};

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

    #[test]
    fn metrics_output_contains_prometheus_help_type_and_values() {
        let observability = ObservabilitySnapshot {
            leaderboard_requests_total: 12,
            refresh_success_total: 4,
            refresh_failures_total: 2,
            persist_failures_total: 1,
            snapshot_restored: 1,
        };

        let metrics = render_prometheus_metrics(31, true, false, observability);

        assert!(metrics.contains("# HELP podium_leaderboard_entries"));
        assert!(metrics.contains("# TYPE podium_leaderboard_requests_total counter"));
        assert!(metrics.contains("podium_leaderboard_entries 31"));
        assert!(metrics.contains("podium_credential_configured 1"));
        assert!(metrics.contains("podium_store_available 0"));
        assert!(metrics.contains("podium_snapshot_restored 1"));
        assert!(metrics.contains("podium_leaderboard_requests_total 12"));
        assert!(metrics.contains("podium_refresh_success_total 4"));
        assert!(metrics.contains("podium_refresh_failures_total 2"));
        assert!(metrics.contains("podium_persist_failures_total 1"));
    }

    #[tokio::test]
    async fn health_and_metrics_expose_expected_contract() {
        let state = AppState::new(None);
        let (addr, server_handle) = spawn_test_server(state).await;
        let base_url = format!("http://{addr}");
        let client = reqwest::Client::new();

        client
            .get(format!("{base_url}/api/leaderboard"))
            .send()
            .await
            .expect("leaderboard request")
            .error_for_status()
            .expect("leaderboard status");

        let health = client
            .get(format!("{base_url}/api/health"))
            .send()
            .await
            .expect("health request")
            .error_for_status()
            .expect("health status")
            .json::<serde_json::Value>()
            .await
            .expect("parse health");

        assert_eq!(health.get("status").and_then(|v| v.as_str()), Some("ok"));
        assert_eq!(health.get("entries").and_then(|v| v.as_u64()), Some(0));
        assert_eq!(
            health.get("credential_configured").and_then(|v| v.as_bool()),
            Some(false)
        );
        assert_eq!(
            health.get("store_available").and_then(|v| v.as_bool()),
            Some(false)
        );
        assert_eq!(
            health
                .get("observability")
                .and_then(|v| v.get("leaderboard_requests_total"))
                .and_then(|v| v.as_u64()),
            Some(1)
        );

        let metrics = client
            .get(format!("{base_url}/api/metrics"))
            .send()
            .await
            .expect("metrics request")
            .error_for_status()
            .expect("metrics status")
            .text()
            .await
            .expect("parse metrics text");

        assert!(metrics.contains("# TYPE podium_leaderboard_requests_total counter"));
        assert!(metrics.contains("podium_leaderboard_requests_total 1"));
        assert!(metrics.contains("podium_store_available 0"));
        assert!(metrics.contains("podium_refresh_success_total 0"));

        server_handle.abort();
        let _ = server_handle.await;
    }
}
