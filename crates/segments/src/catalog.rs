//! Segment catalog — create, soft-delete, and resolve segment definitions.
//!
//! Segments are never physically removed: deactivation flips `is_active` so
//! history and in-flight relations stay resolvable.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use segmentator_core::{SegmentatorError, SegmentatorResult};
use segmentator_store::{encode_ts, store_err, Db};
use tracing::info;

#[derive(Clone)]
pub struct SegmentCatalog {
    db: Arc<Db>,
}

impl SegmentCatalog {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Create a segment, or reactivate it if a row with this slug already
    /// exists (active or not). Idempotent: at most one active segment per
    /// slug can ever exist thanks to the unique index.
    pub fn create_or_reactivate(&self, slug: &str) -> SegmentatorResult<()> {
        if slug.is_empty() {
            return Err(SegmentatorError::InvalidInput(
                "segment slug must not be empty".to_string(),
            ));
        }

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO segments (slug) VALUES (?1)
                 ON CONFLICT (slug) DO UPDATE SET is_active = 1",
                params![slug],
            )
        })?;

        info!(slug, "segment created or reactivated");
        metrics::counter!("segments.created").increment(1);
        Ok(())
    }

    /// Soft-delete a segment. In one transaction the segment is marked
    /// inactive and every active relation referencing it is unassigned with
    /// the current timestamp — a segment must never be inactive while a
    /// relation still reports it as active.
    pub fn deactivate(&self, slug: &str) -> SegmentatorResult<()> {
        let segment_id = self.resolve_ids(&[slug.to_string()])?[0];
        let now = encode_ts(Utc::now());

        self.db.with_tx(|tx| {
            tx.execute(
                "UPDATE segments SET is_active = 0 WHERE id = ?1",
                params![segment_id],
            )
            .map_err(store_err)?;
            tx.execute(
                "UPDATE user_segment_relation
                 SET is_active = 0, date_unassigned = ?1
                 WHERE segment_id = ?2 AND is_active = 1",
                params![now, segment_id],
            )
            .map_err(store_err)?;
            Ok(())
        })?;

        info!(slug, "segment deactivated");
        metrics::counter!("segments.deactivated").increment(1);
        Ok(())
    }

    /// Map slugs to storage ids. The whole call fails with `NotFound` on the
    /// first slug that does not resolve; callers rely on getting exactly one
    /// id per input slug.
    pub fn resolve_ids(&self, slugs: &[String]) -> SegmentatorResult<Vec<i64>> {
        let mut ids = Vec::with_capacity(slugs.len());
        for slug in slugs {
            let id: Option<i64> = self.db.with_conn(|conn| {
                conn.query_row(
                    "SELECT id FROM segments WHERE slug = ?1",
                    params![slug],
                    |row| row.get(0),
                )
                .optional()
            })?;
            match id {
                Some(id) => ids.push(id),
                None => {
                    return Err(SegmentatorError::NotFound(format!("segment '{slug}'")));
                }
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> (Arc<Db>, SegmentCatalog) {
        let db = Arc::new(Db::open_in_memory().unwrap());
        (db.clone(), SegmentCatalog::new(db))
    }

    fn active_segment_count(db: &Db, slug: &str) -> i64 {
        db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM segments WHERE slug = ?1 AND is_active = 1",
                params![slug],
                |row| row.get(0),
            )
        })
        .unwrap()
    }

    #[test]
    fn create_twice_leaves_one_active_row() {
        let (db, catalog) = catalog();
        catalog.create_or_reactivate("vip").unwrap();
        catalog.create_or_reactivate("vip").unwrap();
        assert_eq!(active_segment_count(&db, "vip"), 1);
    }

    #[test]
    fn empty_slug_is_invalid_input() {
        let (_db, catalog) = catalog();
        let err = catalog.create_or_reactivate("").unwrap_err();
        assert!(matches!(err, SegmentatorError::InvalidInput(_)));
    }

    #[test]
    fn deactivate_then_create_reactivates() {
        let (db, catalog) = catalog();
        catalog.create_or_reactivate("beta").unwrap();
        catalog.deactivate("beta").unwrap();
        assert_eq!(active_segment_count(&db, "beta"), 0);

        catalog.create_or_reactivate("beta").unwrap();
        assert_eq!(active_segment_count(&db, "beta"), 1);
    }

    #[test]
    fn deactivate_unknown_slug_is_not_found() {
        let (_db, catalog) = catalog();
        let err = catalog.deactivate("ghost").unwrap_err();
        assert!(matches!(err, SegmentatorError::NotFound(_)));
    }

    #[test]
    fn resolve_ids_fails_on_first_missing_slug() {
        let (_db, catalog) = catalog();
        catalog.create_or_reactivate("known").unwrap();
        let err = catalog
            .resolve_ids(&["known".to_string(), "unknown".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("unknown"));
    }

    #[test]
    fn resolve_ids_returns_one_id_per_slug() {
        let (_db, catalog) = catalog();
        catalog.create_or_reactivate("a").unwrap();
        catalog.create_or_reactivate("b").unwrap();
        let ids = catalog
            .resolve_ids(&["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }
}
