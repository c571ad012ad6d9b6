use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use podium_shared::{Leaderboard, LeaderboardState, RankedEntry, Score};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::config::{REFRESH_INTERVAL_SECS, SCOREBOARD_TOP_N};
use crate::error::FetchError;
use crate::render::render_table;
use crate::state::AppState;

const USERS_ENDPOINT: &str = "users";
const SCOREBOARD_ENDPOINT: &str = "scoreboard";

/// Response envelope shared by all CTFd API endpoints.
#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ApiEnvelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Vec<T>>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct ApiUser {
    name: String,
}

#[derive(Deserialize)]
struct ApiScore {
    name: String,
    score: i64,
}

pub async fn run(state: AppState) {
    let mut interval = tokio::time::interval(Duration::from_secs(REFRESH_INTERVAL_SECS));

    // The interval's immediate first tick doubles as the startup refresh.
    loop {
        interval.tick().await;

        match refresh_once(&state).await {
            Ok(count) => info!("leaderboard refreshed with {count} entries"),
            Err(e) => warn!("leaderboard refresh failed: {e}"),
        }
    }
}

/// One full fetch/merge/publish cycle. Safe to invoke repeatedly and
/// concurrently with the scheduled task: publication replaces the snapshot
/// as a whole, so overlapping cycles are last-writer-wins, never a partial
/// snapshot. Failures leave both the live and the persisted snapshot
/// untouched.
pub async fn refresh_once(state: &AppState) -> Result<usize, FetchError> {
    let entries = match execute_refresh(state).await {
        Ok(entries) => entries,
        Err(e) => {
            state.observability.record_refresh_failure();
            return Err(e);
        }
    };

    let count = entries.len();
    publish(state, entries).await;
    state.observability.record_refresh_success();
    Ok(count)
}

/// Fetch both upstream collections and merge them into a ranked list.
/// Reads shared state only for the credential; publishing is the caller's
/// responsibility.
async fn execute_refresh(state: &AppState) -> Result<Leaderboard, FetchError> {
    let token = {
        let token = state.api_token.read().await;
        token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_owned)
    };
    let Some(token) = token else {
        return Err(FetchError::MissingCredential);
    };

    let roster = fetch_roster(&state.http_client, &state.ctfd_base_url, &token).await?;
    let scores = fetch_scoreboard(&state.http_client, &state.ctfd_base_url, &token).await?;

    Ok(merge_rankings(roster, scores))
}

async fn fetch_roster(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
) -> Result<Vec<ApiUser>, FetchError> {
    let url = format!("{base_url}/api/v1/users");
    fetch_collection(client, USERS_ENDPOINT, &url, token).await
}

async fn fetch_scoreboard(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
) -> Result<Vec<ApiScore>, FetchError> {
    let url = format!("{base_url}/api/v1/scoreboard/top/{SCOREBOARD_TOP_N}");
    fetch_collection(client, SCOREBOARD_ENDPOINT, &url, token).await
}

async fn fetch_collection<T: DeserializeOwned>(
    client: &reqwest::Client,
    endpoint: &'static str,
    url: &str,
    token: &str,
) -> Result<Vec<T>, FetchError> {
    let resp = client
        .get(url)
        .header(reqwest::header::AUTHORIZATION, format!("Token {token}"))
        .send()
        .await
        .map_err(|source| FetchError::Network { endpoint, source })?;
    let status = resp.status();
    let bytes = resp
        .bytes()
        .await
        .map_err(|source| FetchError::Network { endpoint, source })?;

    let envelope: ApiEnvelope<T> = match serde_json::from_slice(&bytes) {
        Ok(envelope) => envelope,
        Err(_) => {
            return Err(FetchError::Api {
                endpoint,
                message: format!(
                    "status {status}; body preview: {}",
                    body_preview(&bytes)
                ),
            });
        }
    };

    if !envelope.success {
        return Err(FetchError::Api {
            endpoint,
            message: envelope
                .message
                .unwrap_or_else(|| format!("unknown error (status {status})")),
        });
    }

    match envelope.data {
        Some(data) if !data.is_empty() => Ok(data),
        _ => Err(FetchError::EmptyResult { endpoint }),
    }
}

fn body_preview(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).chars().take(200).collect()
}

/// Reconcile the roster against the scoreboard and fix the final total
/// order. Every distinct roster name appears exactly once; scoreboard rows
/// missing from the roster are kept.
fn merge_rankings(roster: Vec<ApiUser>, scores: Vec<ApiScore>) -> Leaderboard {
    // Ranks reflect the as-received scoreboard positions until the final
    // sort reassigns them.
    let mut entries: Leaderboard = scores
        .into_iter()
        .enumerate()
        .map(|(idx, row)| RankedEntry {
            name: row.name,
            score: Score::Points(row.score),
            rank: idx as u32 + 1,
        })
        .collect();

    // Roster members outside the top N join as unranked, in discovery order.
    for user in roster {
        if entries.iter().any(|entry| entry.name == user.name) {
            continue;
        }
        let rank = entries.len() as u32 + 1;
        entries.push(RankedEntry {
            name: user.name,
            score: Score::Unranked,
            rank,
        });
    }

    // sort_by is stable: unranked entries compare equal and keep their
    // discovery order.
    entries.sort_by(|a, b| a.score.ranking_cmp(&b.score));
    for (idx, entry) in entries.iter_mut().enumerate() {
        entry.rank = idx as u32 + 1;
    }

    entries
}

/// Persist and swap in a freshly merged leaderboard. A persist failure is
/// logged and counted; the in-memory publication still proceeds so readers
/// get the new data.
async fn publish(state: &AppState, entries: Leaderboard) {
    let seq = state.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
    let next = LeaderboardState {
        seq,
        fetched_at: Utc::now().to_rfc3339(),
        entries,
    };

    if let Some(store) = state.store.as_ref()
        && let Err(e) = store.save_snapshot(&next).await
    {
        state.observability.record_persist_failure();
        warn!("failed to persist leaderboard snapshot; continuing with in-memory update: {e}");
    }

    install_snapshot(state, next).await;
}

/// Pre-render the payloads once, then replace the live snapshot in a single
/// write-lock swap. Readers only ever observe the previous snapshot or the
/// complete new one.
pub async fn install_snapshot(state: &AppState, next: LeaderboardState) {
    let table_html = Arc::new(Bytes::from(render_table(&next.entries)));
    let state_json = match serde_json::to_vec(&next) {
        Ok(json) => Arc::new(Bytes::from(json)),
        Err(e) => {
            warn!("failed to serialize leaderboard state payload: {e}");
            return;
        }
    };

    let mut current = state.live_snapshot.write().await;
    current.seq = next.seq;
    current.fetched_at = next.fetched_at;
    current.entries = next.entries;
    current.table_html = table_html;
    current.state_json = state_json;
}
