//! Assignment engine — the sole writer of relation activation.
//!
//! Invariant: at most one active relation per (user, segment) pair. Every
//! mutation path runs inside one transaction; a partial failure rolls the
//! whole call back.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rusqlite::{params, OptionalExtension};
use segmentator_core::types::UserSegments;
use segmentator_core::{SegmentatorError, SegmentatorResult};
use segmentator_store::{encode_ts, store_err, Db};
use tracing::{debug, info};

use crate::catalog::SegmentCatalog;

#[derive(Clone)]
pub struct AssignmentEngine {
    db: Arc<Db>,
    catalog: SegmentCatalog,
}

impl AssignmentEngine {
    pub fn new(db: Arc<Db>) -> Self {
        Self {
            catalog: SegmentCatalog::new(db.clone()),
            db,
        }
    }

    /// Assign every segment in `slugs` to every user in `user_ids`.
    ///
    /// A pair that already holds an active relation is skipped and the batch
    /// continues. `ttl_days > 0` stamps the relation with a deadline that
    /// many calendar days after assignment; zero means no expiration.
    pub fn assign(&self, user_ids: &[i64], slugs: &[String], ttl_days: i64) -> SegmentatorResult<()> {
        if slugs.is_empty() {
            return Ok(());
        }
        if ttl_days < 0 {
            return Err(SegmentatorError::InvalidInput(format!(
                "ttl must be non-negative, got {ttl_days}"
            )));
        }

        let segment_ids = self.catalog.resolve_ids(slugs)?;
        let now = Utc::now();
        let assigned_at = encode_ts(now);
        let deadline = (ttl_days > 0).then(|| encode_ts(now + Duration::days(ttl_days)));

        let mut inserted = 0u64;
        self.db.with_tx(|tx| {
            for &user_id in user_ids {
                for &segment_id in &segment_ids {
                    let active: Option<i64> = tx
                        .query_row(
                            "SELECT id FROM user_segment_relation
                             WHERE is_active = 1 AND user_id = ?1 AND segment_id = ?2",
                            params![user_id, segment_id],
                            |row| row.get(0),
                        )
                        .optional()
                        .map_err(store_err)?;

                    if active.is_some() {
                        debug!(user_id, segment_id, "pair already assigned, skipping");
                        continue;
                    }

                    tx.execute(
                        "INSERT INTO user_segment_relation
                         (user_id, segment_id, is_active, date_assigned, date_unassigned)
                         VALUES (?1, ?2, 1, ?3, ?4)",
                        params![user_id, segment_id, assigned_at, deadline],
                    )
                    .map_err(store_err)?;
                    inserted += 1;
                }
            }
            Ok(())
        })?;

        info!(
            users = user_ids.len(),
            segments = segment_ids.len(),
            inserted,
            "segments assigned"
        );
        metrics::counter!("assignment.assigned").increment(inserted);
        Ok(())
    }

    /// Unassign every segment in `slugs` from every user in `user_ids`.
    /// A pair with no active relation is a no-op, not an error.
    pub fn unassign(&self, user_ids: &[i64], slugs: &[String]) -> SegmentatorResult<()> {
        if slugs.is_empty() {
            return Ok(());
        }

        let segment_ids = self.catalog.resolve_ids(slugs)?;
        let now = encode_ts(Utc::now());

        let mut flipped = 0u64;
        self.db.with_tx(|tx| {
            for &user_id in user_ids {
                for &segment_id in &segment_ids {
                    let n = tx
                        .execute(
                            "UPDATE user_segment_relation
                             SET is_active = 0, date_unassigned = ?1
                             WHERE user_id = ?2 AND segment_id = ?3 AND is_active = 1",
                            params![now, user_id, segment_id],
                        )
                        .map_err(store_err)?;
                    flipped += n as u64;
                }
            }
            Ok(())
        })?;

        info!(users = user_ids.len(), segments = segment_ids.len(), flipped, "segments unassigned");
        metrics::counter!("assignment.unassigned").increment(flipped);
        Ok(())
    }

    /// Slugs of all segments the user actively holds. The join checks the
    /// segment's own active flag as well: a deactivated segment must not
    /// surface even if its relation row is still flagged active.
    pub fn user_segments(&self, user_id: i64) -> SegmentatorResult<UserSegments> {
        let segments = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.slug
                 FROM segments s
                 JOIN user_segment_relation r ON r.segment_id = s.id
                 WHERE r.user_id = ?1 AND r.is_active = 1 AND s.is_active = 1
                 ORDER BY s.slug",
            )?;
            let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;

        Ok(UserSegments { user_id, segments })
    }
}
