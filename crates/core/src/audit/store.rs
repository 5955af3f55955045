use chrono::{DateTime, Utc};
use thiserror::Error;

use super::AuditRecord;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Page size used when a filter does not set one.
pub const DEFAULT_AUDIT_LIMIT: i64 = 100;

/// Which audit records to return. Unset fields match everything; `from` and
/// `to` are inclusive.
#[derive(Debug, Clone)]
pub struct AuditFilter {
    pub asset_id: Option<String>,
    pub game_id: Option<String>,
    pub event_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            asset_id: None,
            game_id: None,
            event_type: None,
            from: None,
            to: None,
            limit: DEFAULT_AUDIT_LIMIT,
            offset: 0,
        }
    }
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset_id(mut self, asset_id: impl Into<String>) -> Self {
        self.asset_id = Some(asset_id.into());
        self
    }

    pub fn with_game_id(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = Some(game_id.into());
        self
    }

    /// Match one event kind, e.g. `upload_completed`.
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_time_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Append-only storage behind the audit writer.
pub trait AuditStore: Send + Sync {
    /// Persist one record and return its row id.
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError>;

    /// Records matching `filter`, newest first.
    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError>;

    /// Number of records matching `filter`, ignoring paging.
    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_has_a_page_size() {
        let filter = AuditFilter::default();
        assert_eq!(filter.limit, DEFAULT_AUDIT_LIMIT);
        assert_eq!(filter.offset, 0);
        assert!(filter.event_type.is_none());
    }
}
