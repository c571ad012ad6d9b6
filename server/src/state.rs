use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chrono::Utc;
use podium_shared::{Leaderboard, LeaderboardState};
use tokio::sync::RwLock;
use tracing::warn;

use crate::config::{upstream_connect_timeout, upstream_http_timeout};
use crate::render::render_table;
use crate::store::Store;

/// The published leaderboard plus its pre-built payloads. Serialized and
/// rendered once at publish time, shared by all readers via Arc.
#[derive(Debug, Clone)]
pub struct LiveSnapshot {
    pub seq: u64,
    pub fetched_at: String,
    pub entries: Leaderboard,
    pub table_html: Arc<Bytes>,
    pub state_json: Arc<Bytes>,
}

impl Default for LiveSnapshot {
    fn default() -> Self {
        let seq = 0;
        let fetched_at = Utc::now().to_rfc3339();
        let entries = Leaderboard::new();
        let state_json = serde_json::to_vec(&LeaderboardState {
            seq,
            fetched_at: fetched_at.clone(),
            entries: entries.clone(),
        })
        .map(Bytes::from)
        .unwrap_or_else(|_| Bytes::from_static(br#"{"seq":0,"fetched_at":"","entries":[]}"#));

        Self {
            seq,
            fetched_at,
            entries,
            table_html: Arc::new(Bytes::from(render_table(&[]))),
            state_json: Arc::new(state_json),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub live_snapshot: Arc<RwLock<LiveSnapshot>>,
    pub next_seq: Arc<AtomicU64>,
    /// Bearer token for the upstream CTFd API. None until configured.
    pub api_token: Arc<RwLock<Option<String>>>,
    pub ctfd_base_url: String,
    pub http_client: reqwest::Client,
    /// Key-value persistence for credential and snapshot. None if
    /// DATABASE_URL is not set.
    pub store: Option<Store>,
    pub observability: Arc<ObservabilityCounters>,
}

#[derive(Debug, Default)]
pub struct ObservabilityCounters {
    leaderboard_requests_total: AtomicU64,
    refresh_success_total: AtomicU64,
    refresh_failures_total: AtomicU64,
    persist_failures_total: AtomicU64,
    snapshot_restored: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct ObservabilitySnapshot {
    pub leaderboard_requests_total: u64,
    pub refresh_success_total: u64,
    pub refresh_failures_total: u64,
    pub persist_failures_total: u64,
    pub snapshot_restored: u64,
}

impl ObservabilityCounters {
    pub fn snapshot(&self) -> ObservabilitySnapshot {
        ObservabilitySnapshot {
            leaderboard_requests_total: self.leaderboard_requests_total.load(Ordering::Relaxed),
            refresh_success_total: self.refresh_success_total.load(Ordering::Relaxed),
            refresh_failures_total: self.refresh_failures_total.load(Ordering::Relaxed),
            persist_failures_total: self.persist_failures_total.load(Ordering::Relaxed),
            snapshot_restored: self.snapshot_restored.load(Ordering::Relaxed),
        }
    }

    pub fn record_leaderboard_request(&self) {
        self.leaderboard_requests_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh_success(&self) {
        self.refresh_success_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh_failure(&self) {
        self.refresh_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persist_failure(&self) {
        self.persist_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_restored(&self) {
        self.snapshot_restored.store(1, Ordering::Relaxed);
    }
}

impl AppState {
    pub fn new(store: Option<Store>) -> Self {
        let request_timeout = upstream_http_timeout();
        let connect_timeout = upstream_connect_timeout();
        let http_client = reqwest::Client::builder()
            .user_agent("podium/0.1")
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .or_else(|e| {
                warn!(
                    error = %e,
                    "failed to build configured HTTP client, retrying without custom user-agent"
                );
                reqwest::Client::builder()
                    .timeout(request_timeout)
                    .connect_timeout(connect_timeout)
                    .build()
            })
            .unwrap_or_else(|e| {
                panic!("failed to build timeout-configured HTTP client: {e}");
            });

        Self {
            live_snapshot: Arc::new(RwLock::new(LiveSnapshot::default())),
            next_seq: Arc::new(AtomicU64::new(0)),
            api_token: Arc::new(RwLock::new(None)),
            ctfd_base_url: crate::config::ctfd_base_url(),
            http_client,
            store,
            observability: Arc::new(ObservabilityCounters::default()),
        }
    }
}
