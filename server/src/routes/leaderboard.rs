use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::state::AppState;

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
const JSON_CONTENT_TYPE: &str = "application/json";
const CACHE_CONTROL: &str = "public, max-age=60";

/// Serve the pre-rendered leaderboard table fragment. Never triggers a
/// fetch; an empty snapshot yields a header-only table.
pub async fn get_leaderboard(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    state.observability.record_leaderboard_request();
    let (etag, html): (String, Arc<Bytes>) = {
        let snapshot = state.live_snapshot.read().await;
        (
            leaderboard_etag(snapshot.seq),
            Arc::clone(&snapshot.table_html),
        )
    };

    if if_none_match_matches(&headers, &etag) {
        return not_modified_response(CACHE_CONTROL, Some(etag.as_str()));
    }

    bytes_response(
        (*html).clone(),
        HTML_CONTENT_TYPE,
        CACHE_CONTROL,
        Some(etag.as_str()),
    )
}

/// Serve the pre-serialized LeaderboardState JSON without cloning the
/// entry list or re-serializing.
pub async fn get_leaderboard_state(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (etag, json): (String, Arc<Bytes>) = {
        let snapshot = state.live_snapshot.read().await;
        (state_etag(snapshot.seq), Arc::clone(&snapshot.state_json))
    };

    if if_none_match_matches(&headers, &etag) {
        return not_modified_response(CACHE_CONTROL, Some(etag.as_str()));
    }

    bytes_response(
        (*json).clone(),
        JSON_CONTENT_TYPE,
        CACHE_CONTROL,
        Some(etag.as_str()),
    )
}

fn leaderboard_etag(seq: u64) -> String {
    format!("\"leaderboard-{seq}\"")
}

fn state_etag(seq: u64) -> String {
    format!("\"leaderboard-state-{seq}\"")
}

fn bytes_response(
    body: Bytes,
    content_type: &'static str,
    cache_control: &'static str,
    etag: Option<&str>,
) -> Response {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Some(etag) = etag
        && let Ok(etag_header) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn not_modified_response(cache_control: &'static str, etag: Option<&str>) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Some(etag) = etag
        && let Ok(etag_header) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn normalize_etag(candidate: &str) -> &str {
    candidate.strip_prefix("W/").unwrap_or(candidate).trim()
}

fn if_none_match_matches(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers.get(header::IF_NONE_MATCH) else {
        return false;
    };
    let Ok(raw) = value.to_str() else {
        return false;
    };

    raw.split(',').any(|candidate| {
        let candidate = candidate.trim();
        candidate == "*" || normalize_etag(candidate) == normalize_etag(etag)
    })
}
