use std::path::Path;

use podium_shared::LeaderboardState;
use sqlx_core::error::Error as SqlxError;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;
use tracing::warn;

/// Settings key holding the upstream API credential.
pub const SETTING_API_TOKEN: &str = "ctfd_api_token";

/// Settings key holding the last published leaderboard, as one JSON value.
pub const SETTING_SNAPSHOT: &str = "leaderboard_snapshot";

const WORKSPACE_MIGRATIONS_DIR: &str = "server/migrations";
const CRATE_MIGRATIONS_DIR: &str = "./migrations";

fn migrations_path() -> &'static Path {
    let workspace_path = Path::new(WORKSPACE_MIGRATIONS_DIR);
    if workspace_path.exists() {
        return workspace_path;
    }
    Path::new(CRATE_MIGRATIONS_DIR)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx_core::migrate::MigrateError> {
    let migrator = sqlx_core::migrate::Migrator::new(migrations_path()).await?;
    migrator.run(pool).await
}

/// Key-value persistence for the credential and the published snapshot.
/// Each value is replaced as a whole; the snapshot in particular is one row,
/// so readers of the store never see a partial leaderboard.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, SqlxError> {
        let row: Option<(String,)> = query_as("SELECT value FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    pub async fn put(&self, key: &str, value: &str) -> Result<(), SqlxError> {
        query(
            "INSERT INTO settings (key, value, updated_at) VALUES ($1, $2, now()) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_api_token(&self) -> Result<Option<String>, SqlxError> {
        self.get(SETTING_API_TOKEN).await
    }

    pub async fn save_api_token(&self, token: &str) -> Result<(), SqlxError> {
        self.put(SETTING_API_TOKEN, token).await
    }

    /// The persisted snapshot, or None when absent. An undecodable stored
    /// value is discarded with a warning rather than failing startup.
    pub async fn load_snapshot(&self) -> Result<Option<LeaderboardState>, SqlxError> {
        let Some(raw) = self.get(SETTING_SNAPSHOT).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!("discarding undecodable persisted leaderboard snapshot: {e}");
                Ok(None)
            }
        }
    }

    pub async fn save_snapshot(&self, state: &LeaderboardState) -> Result<(), SqlxError> {
        let raw = serde_json::to_string(state).map_err(|e| SqlxError::Encode(Box::new(e)))?;
        self.put(SETTING_SNAPSHOT, &raw).await
    }
}
