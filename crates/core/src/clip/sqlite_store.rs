//! SQLite-backed clip store.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OptionalExtension};

use super::{Clip, ClipError, ClipFilter, ClipStore, Priority, Visibility};

const SELECT_COLUMNS: &str = "id, asset_id, game_id, start_time, end_time, title, description, visibility, assigned_player_ids, tags, play_type, priority, coach_notes, learning_objective, created_at, updated_at";

/// SQLite-backed clip store.
pub struct SqliteClipStore {
    conn: Mutex<Connection>,
}

impl SqliteClipStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, ClipError> {
        let conn = Connection::open(path).map_err(|e| ClipError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, ClipError> {
        let conn =
            Connection::open_in_memory().map_err(|e| ClipError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), ClipError> {
        Self::register_functions(conn)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS clips (
                id TEXT PRIMARY KEY,
                asset_id TEXT NOT NULL,
                game_id TEXT NOT NULL,
                start_time REAL NOT NULL,
                end_time REAL NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                visibility TEXT NOT NULL,
                assigned_player_ids TEXT NOT NULL DEFAULT '[]',
                tags TEXT NOT NULL DEFAULT '[]',
                play_type TEXT,
                priority TEXT NOT NULL,
                coach_notes TEXT NOT NULL DEFAULT '',
                learning_objective TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_clips_asset ON clips(asset_id, start_time);
            CREATE INDEX IF NOT EXISTS idx_clips_game ON clips(game_id, start_time);
            "#,
        )
        .map_err(|e| ClipError::Database(e.to_string()))?;

        Ok(())
    }

    /// SQLite's `LOWER()` folds ASCII only; search needs both sides folded
    /// the same way as `str::to_lowercase`.
    fn register_functions(conn: &Connection) -> Result<(), ClipError> {
        conn.create_scalar_function(
            "fold_case",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let value: Option<String> = ctx.get(0)?;
                Ok(value.map(|s| s.to_lowercase()))
            },
        )
        .map_err(|e| ClipError::Database(e.to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, ClipError> {
        self.conn
            .lock()
            .map_err(|_| ClipError::Database("connection mutex poisoned".to_string()))
    }

    fn build_where_clause(filter: &ClipFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref asset_id) = filter.asset_id {
            conditions.push("asset_id = ?");
            params.push(Box::new(asset_id.clone()));
        }

        if let Some(ref game_id) = filter.game_id {
            conditions.push("game_id = ?");
            params.push(Box::new(game_id.clone()));
        }

        if let Some(visibility) = filter.visibility {
            conditions.push("visibility = ?");
            params.push(Box::new(visibility.as_str()));
        }

        if let Some(ref tag) = filter.tag {
            conditions.push("EXISTS (SELECT 1 FROM json_each(clips.tags) WHERE json_each.value = ?)");
            params.push(Box::new(tag.trim().to_string()));
        }

        if let Some(ref player_id) = filter.player_id {
            conditions.push(
                "EXISTS (SELECT 1 FROM json_each(clips.assigned_player_ids) WHERE json_each.value = ?)",
            );
            params.push(Box::new(player_id.clone()));
        }

        if let Some(ref search) = filter.search {
            let term = search.trim();
            if !term.is_empty() {
                conditions.push(
                    "(fold_case(title) LIKE ? ESCAPE '\\' OR fold_case(COALESCE(description, '')) LIKE ? ESCAPE '\\' OR fold_case(COALESCE(play_type, '')) LIKE ? ESCAPE '\\')",
                );
                let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
                for _ in 0..3 {
                    params.push(Box::new(pattern.clone()));
                }
            }
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_clip(row: &rusqlite::Row) -> rusqlite::Result<Clip> {
        let visibility_str: String = row.get(7)?;
        let players_json: String = row.get(8)?;
        let tags_json: String = row.get(9)?;
        let priority_str: String = row.get(11)?;
        let created_at_str: String = row.get(14)?;
        let updated_at_str: String = row.get(15)?;

        let visibility: Visibility = visibility_str.parse().map_err(|e: ClipError| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let priority: Priority = priority_str.parse().map_err(|e: ClipError| {
            rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e))
        })?;

        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let assigned_player_ids: BTreeSet<String> =
            serde_json::from_str(&players_json).unwrap_or_default();
        let tags: BTreeSet<String> = serde_json::from_str(&tags_json).unwrap_or_default();

        Ok(Clip {
            id: row.get(0)?,
            asset_id: row.get(1)?,
            game_id: row.get(2)?,
            start_time: row.get(3)?,
            end_time: row.get(4)?,
            title: row.get(5)?,
            description: row.get(6)?,
            visibility,
            assigned_player_ids,
            tags,
            play_type: row.get(10)?,
            priority,
            coach_notes: row.get(12)?,
            learning_objective: row.get(13)?,
            created_at,
            updated_at,
        })
    }

    fn encode_sets(clip: &Clip) -> Result<(String, String), ClipError> {
        let players = serde_json::to_string(&clip.assigned_player_ids)
            .map_err(|e| ClipError::Database(e.to_string()))?;
        let tags =
            serde_json::to_string(&clip.tags).map_err(|e| ClipError::Database(e.to_string()))?;
        Ok((players, tags))
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl ClipStore for SqliteClipStore {
    fn insert(&self, clip: &Clip) -> Result<(), ClipError> {
        let conn = self.lock()?;
        let (players_json, tags_json) = Self::encode_sets(clip)?;

        conn.execute(
            &format!(
                "INSERT INTO clips ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                SELECT_COLUMNS
            ),
            params![
                clip.id,
                clip.asset_id,
                clip.game_id,
                clip.start_time,
                clip.end_time,
                clip.title,
                clip.description,
                clip.visibility.as_str(),
                players_json,
                tags_json,
                clip.play_type,
                clip.priority.as_str(),
                clip.coach_notes,
                clip.learning_objective,
                clip.created_at.to_rfc3339(),
                clip.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| ClipError::Database(e.to_string()))?;

        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Clip>, ClipError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM clips WHERE id = ?", SELECT_COLUMNS),
            params![id],
            Self::row_to_clip,
        )
        .optional()
        .map_err(|e| ClipError::Database(e.to_string()))
    }

    fn update(&self, clip: &Clip) -> Result<(), ClipError> {
        let conn = self.lock()?;
        let (players_json, tags_json) = Self::encode_sets(clip)?;

        let changed = conn
            .execute(
                "UPDATE clips SET start_time = ?, end_time = ?, title = ?, description = ?, visibility = ?, assigned_player_ids = ?, tags = ?, play_type = ?, priority = ?, coach_notes = ?, learning_objective = ?, updated_at = ? WHERE id = ?",
                params![
                    clip.start_time,
                    clip.end_time,
                    clip.title,
                    clip.description,
                    clip.visibility.as_str(),
                    players_json,
                    tags_json,
                    clip.play_type,
                    clip.priority.as_str(),
                    clip.coach_notes,
                    clip.learning_objective,
                    clip.updated_at.to_rfc3339(),
                    clip.id,
                ],
            )
            .map_err(|e| ClipError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(ClipError::NotFound(clip.id.clone()));
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), ClipError> {
        let conn = self.lock()?;
        let changed = conn
            .execute("DELETE FROM clips WHERE id = ?", params![id])
            .map_err(|e| ClipError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(ClipError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn list(&self, filter: &ClipFilter) -> Result<Vec<Clip>, ClipError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM clips {} ORDER BY start_time ASC, created_at ASC, rowid ASC LIMIT ? OFFSET ?",
            SELECT_COLUMNS, where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| ClipError::Database(e.to_string()))?;

        let mut all_params = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_clip)
            .map_err(|e| ClipError::Database(e.to_string()))?;

        let mut clips = Vec::new();
        for row_result in rows {
            clips.push(row_result.map_err(|e| ClipError::Database(e.to_string()))?);
        }

        Ok(clips)
    }

    fn count(&self, filter: &ClipFilter) -> Result<i64, ClipError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM clips {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| ClipError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_store() -> SqliteClipStore {
        SqliteClipStore::in_memory().unwrap()
    }

    fn clip(id: &str, asset_id: &str, start: f64, end: f64) -> Clip {
        let now = Utc::now();
        Clip {
            id: id.to_string(),
            asset_id: asset_id.to_string(),
            game_id: "g1".to_string(),
            start_time: start,
            end_time: end,
            title: format!("Clip {}", id),
            description: None,
            visibility: Visibility::Team,
            assigned_player_ids: BTreeSet::new(),
            tags: BTreeSet::new(),
            play_type: None,
            priority: Priority::Medium,
            coach_notes: String::new(),
            learning_objective: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_insert_and_get_round_trips_sets() {
        let store = create_test_store();
        let mut c = clip("c1", "a1", 1.0, 9.5);
        c.tags = ["blitz", "3rd down"].into_iter().map(String::from).collect();
        c.assigned_player_ids = ["p1", "p2"].into_iter().map(String::from).collect();
        c.visibility = Visibility::Player;
        c.description = Some("Watch the nickel".to_string());
        store.insert(&c).unwrap();

        let fetched = store.get("c1").unwrap().unwrap();
        assert_eq!(fetched.tags, c.tags);
        assert_eq!(fetched.assigned_player_ids, c.assigned_player_ids);
        assert_eq!(fetched.visibility, Visibility::Player);
        assert_eq!(fetched.end_time, 9.5);
        assert_eq!(fetched.description.as_deref(), Some("Watch the nickel"));
    }

    #[test]
    fn test_list_ordered_by_start_time() {
        let store = create_test_store();
        store.insert(&clip("late", "a1", 50.0, 60.0)).unwrap();
        store.insert(&clip("early", "a1", 5.0, 80.0)).unwrap();
        store.insert(&clip("other", "a2", 0.0, 1.0)).unwrap();

        let clips = store.list(&ClipFilter::new().with_asset("a1")).unwrap();
        let ids: Vec<&str> = clips.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn test_filter_by_tag_and_player() {
        let store = create_test_store();
        let mut a = clip("a", "a1", 0.0, 1.0);
        a.tags.insert("blitz".to_string());
        a.assigned_player_ids.insert("p9".to_string());
        let mut b = clip("b", "a1", 2.0, 3.0);
        b.tags.insert("blitz-pickup".to_string());
        store.insert(&a).unwrap();
        store.insert(&b).unwrap();

        let tagged = store.list(&ClipFilter::new().with_tag("blitz")).unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].id, "a");

        let assigned = store.list(&ClipFilter::new().with_player("p9")).unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(store.count(&ClipFilter::new().with_player("p0")).unwrap(), 0);
    }

    #[test]
    fn test_search_is_case_insensitive_and_literal() {
        let store = create_test_store();
        let mut a = clip("a", "a1", 0.0, 1.0);
        a.title = "Red Zone Fade".to_string();
        let mut b = clip("b", "a1", 2.0, 3.0);
        b.play_type = Some("Outside zone".to_string());
        let mut c = clip("c", "a1", 4.0, 5.0);
        c.description = Some("100% effort".to_string());
        store.insert(&a).unwrap();
        store.insert(&b).unwrap();
        store.insert(&c).unwrap();

        let zone = store.list(&ClipFilter::new().with_search("ZONE")).unwrap();
        assert_eq!(zone.len(), 2);

        let percent = store.list(&ClipFilter::new().with_search("%")).unwrap();
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].id, "c");
    }

    #[test]
    fn test_search_folds_non_ascii_case() {
        let store = create_test_store();
        let mut a = clip("a", "a1", 0.0, 1.0);
        a.title = "Ángulo Ciego".to_string();
        let mut b = clip("b", "a1", 2.0, 3.0);
        b.play_type = Some("ÉCRAN".to_string());
        store.insert(&a).unwrap();
        store.insert(&b).unwrap();

        for term in ["Ángulo", "ángulo", "ÁNGULO CIEGO"] {
            let hits = store.list(&ClipFilter::new().with_search(term)).unwrap();
            assert_eq!(hits.len(), 1, "search {:?}", term);
            assert_eq!(hits[0].id, "a");
        }
        assert_eq!(store.count(&ClipFilter::new().with_search("écran")).unwrap(), 1);
    }

    #[test]
    fn test_default_filter_lists_clips() {
        let store = create_test_store();
        store.insert(&clip("c1", "a1", 0.0, 1.0)).unwrap();

        let filter = ClipFilter::default();
        assert_eq!(filter.limit, 500);
        assert_eq!(store.list(&filter).unwrap().len(), 1);
    }

    #[test]
    fn test_update_and_delete_missing() {
        let store = create_test_store();
        let c = clip("c1", "a1", 0.0, 1.0);
        assert!(matches!(store.update(&c), Err(ClipError::NotFound(_))));
        assert!(matches!(store.delete("c1"), Err(ClipError::NotFound(_))));

        store.insert(&c).unwrap();
        store.delete("c1").unwrap();
        assert!(store.get("c1").unwrap().is_none());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clips.db");
        {
            let store = SqliteClipStore::new(&path).unwrap();
            store.insert(&clip("c1", "a1", 0.0, 1.0)).unwrap();
        }
        let store = SqliteClipStore::new(&path).unwrap();
        assert!(store.get("c1").unwrap().is_some());
    }
}
