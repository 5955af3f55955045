//! SQLite-backed asset registry.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    AssetError, AssetFilter, AssetStore, AssetUpdate, CreateAssetRequest, ProcessingState,
    Quality, VideoAsset,
};

const SELECT_COLUMNS: &str = "id, owner_id, game_id, raw_location, size_bytes, variants, thumbnails, state, failure_reason, duration_secs, created_at, updated_at";

/// SQLite-backed asset store.
pub struct SqliteAssetStore {
    conn: Mutex<Connection>,
}

impl SqliteAssetStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, AssetError> {
        let conn = Connection::open(path).map_err(|e| AssetError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, AssetError> {
        let conn =
            Connection::open_in_memory().map_err(|e| AssetError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), AssetError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS video_assets (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                game_id TEXT NOT NULL,
                raw_location TEXT NOT NULL,
                size_bytes INTEGER NOT NULL DEFAULT 0,
                variants TEXT NOT NULL DEFAULT '{}',
                thumbnails TEXT NOT NULL DEFAULT '[]',
                state TEXT NOT NULL,
                failure_reason TEXT,
                duration_secs REAL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_assets_owner ON video_assets(owner_id);
            CREATE INDEX IF NOT EXISTS idx_assets_game ON video_assets(game_id, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_assets_state ON video_assets(state);
            "#,
        )
        .map_err(|e| AssetError::Database(e.to_string()))?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AssetError> {
        self.conn
            .lock()
            .map_err(|_| AssetError::Database("connection mutex poisoned".to_string()))
    }

    fn build_where_clause(filter: &AssetFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref owner_id) = filter.owner_id {
            conditions.push("owner_id = ?");
            params.push(Box::new(owner_id.clone()));
        }

        if let Some(ref game_id) = filter.game_id {
            conditions.push("game_id = ?");
            params.push(Box::new(game_id.clone()));
        }

        if let Some(state) = filter.state {
            conditions.push("state = ?");
            params.push(Box::new(state.as_str()));
        }

        if filter.unfinished {
            conditions.push("state IN ('pending', 'processing')");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_asset(row: &rusqlite::Row) -> rusqlite::Result<VideoAsset> {
        let variants_json: String = row.get(5)?;
        let thumbnails_json: String = row.get(6)?;
        let state_str: String = row.get(7)?;
        let created_at_str: String = row.get(10)?;
        let updated_at_str: String = row.get(11)?;

        let state: ProcessingState = state_str.parse().map_err(|e: AssetError| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;

        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let variants: BTreeMap<Quality, String> =
            serde_json::from_str(&variants_json).unwrap_or_default();
        let thumbnails: Vec<String> = serde_json::from_str(&thumbnails_json).unwrap_or_default();

        Ok(VideoAsset {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            game_id: row.get(2)?,
            raw_location: row.get(3)?,
            size_bytes: row.get::<_, i64>(4)?.max(0) as u64,
            variants,
            thumbnails,
            state,
            failure_reason: row.get(8)?,
            duration_secs: row.get(9)?,
            created_at,
            updated_at,
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<VideoAsset, AssetError> {
        conn.query_row(
            &format!("SELECT {} FROM video_assets WHERE id = ?", SELECT_COLUMNS),
            params![id],
            Self::row_to_asset,
        )
        .optional()
        .map_err(|e| AssetError::Database(e.to_string()))?
        .ok_or_else(|| AssetError::NotFound(id.to_string()))
    }

    fn persist(conn: &Connection, asset: &VideoAsset) -> Result<(), AssetError> {
        let variants_json =
            serde_json::to_string(&asset.variants).map_err(|e| AssetError::Database(e.to_string()))?;
        let thumbnails_json = serde_json::to_string(&asset.thumbnails)
            .map_err(|e| AssetError::Database(e.to_string()))?;

        conn.execute(
            "UPDATE video_assets SET variants = ?, thumbnails = ?, state = ?, failure_reason = ?, duration_secs = ?, updated_at = ? WHERE id = ?",
            params![
                variants_json,
                thumbnails_json,
                asset.state.as_str(),
                asset.failure_reason,
                asset.duration_secs,
                asset.updated_at.to_rfc3339(),
                asset.id,
            ],
        )
        .map_err(|e| AssetError::Database(e.to_string()))?;

        Ok(())
    }
}

impl AssetStore for SqliteAssetStore {
    fn create(&self, request: CreateAssetRequest) -> Result<VideoAsset, AssetError> {
        let conn = self.lock()?;
        let now = Utc::now();

        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO video_assets (id, owner_id, game_id, raw_location, size_bytes, variants, thumbnails, state, created_at, updated_at) VALUES (?, ?, ?, ?, ?, '{}', '[]', ?, ?, ?)",
                params![
                    request.id,
                    request.owner_id,
                    request.game_id,
                    request.raw_location,
                    request.size_bytes as i64,
                    ProcessingState::Pending.as_str(),
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )
            .map_err(|e| AssetError::Database(e.to_string()))?;

        if inserted == 0 {
            return Err(AssetError::AlreadyExists(request.id));
        }

        Ok(VideoAsset {
            id: request.id,
            owner_id: request.owner_id,
            game_id: request.game_id,
            raw_location: request.raw_location,
            size_bytes: request.size_bytes,
            variants: BTreeMap::new(),
            thumbnails: Vec::new(),
            state: ProcessingState::Pending,
            failure_reason: None,
            duration_secs: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn get(&self, id: &str) -> Result<Option<VideoAsset>, AssetError> {
        let conn = self.lock()?;
        match Self::fetch(&conn, id) {
            Ok(asset) => Ok(Some(asset)),
            Err(AssetError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn update(&self, id: &str, update: AssetUpdate) -> Result<VideoAsset, AssetError> {
        let conn = self.lock()?;
        let current = Self::fetch(&conn, id)?;
        let next = current.merged(&update)?;
        Self::persist(&conn, &next)?;
        Ok(next)
    }

    fn transition(
        &self,
        id: &str,
        expected: ProcessingState,
        update: AssetUpdate,
    ) -> Result<VideoAsset, AssetError> {
        let conn = self.lock()?;
        let current = Self::fetch(&conn, id)?;

        if current.state != expected {
            return Err(AssetError::StateConflict {
                asset_id: id.to_string(),
                expected,
                actual: current.state,
            });
        }

        let next = current.merged(&update)?;
        Self::persist(&conn, &next)?;
        Ok(next)
    }

    fn list(&self, filter: &AssetFilter) -> Result<Vec<VideoAsset>, AssetError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM video_assets {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            SELECT_COLUMNS, where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AssetError::Database(e.to_string()))?;

        let mut all_params = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_asset)
            .map_err(|e| AssetError::Database(e.to_string()))?;

        let mut assets = Vec::new();
        for row_result in rows {
            assets.push(row_result.map_err(|e| AssetError::Database(e.to_string()))?);
        }

        Ok(assets)
    }
}
