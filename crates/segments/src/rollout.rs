//! Percentage-based auto-rollout: sample a random fraction of the active
//! user population that lacks a segment and assign it to them.

use std::sync::Arc;

use rusqlite::params;
use segmentator_core::{SegmentatorError, SegmentatorResult};
use segmentator_store::Db;
use tracing::info;

use crate::assignment::AssignmentEngine;

#[derive(Clone)]
pub struct RolloutSampler {
    db: Arc<Db>,
    engine: AssignmentEngine,
}

impl RolloutSampler {
    pub fn new(db: Arc<Db>) -> Self {
        Self {
            engine: AssignmentEngine::new(db.clone()),
            db,
        }
    }

    /// Assign `slug` to `ceil(active_users * fraction / 100)` randomly drawn
    /// eligible users. Eligible means active and not currently holding the
    /// segment. Fewer eligible users than the sample size is partial
    /// fulfillment, not an error. Returns the number of users drawn.
    pub fn auto_assign(&self, fraction: i64, slug: &str, ttl_days: i64) -> SegmentatorResult<usize> {
        if !(1..=100).contains(&fraction) {
            return Err(SegmentatorError::InvalidInput(format!(
                "fraction must be within 1..=100, got {fraction}"
            )));
        }

        let active_users = self.active_user_count()?;
        // ceil(active_users * fraction / 100) in integer arithmetic
        let sample_size = (active_users * fraction + 99) / 100;
        let users = self.random_users_without_segment(sample_size, slug)?;

        self.engine.assign(&users, &[slug.to_string()], ttl_days)?;

        info!(slug, fraction, drawn = users.len(), "auto-rollout complete");
        metrics::counter!("rollout.users_drawn").increment(users.len() as u64);
        Ok(users.len())
    }

    fn active_user_count(&self) -> SegmentatorResult<i64> {
        self.db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(id) FROM users WHERE is_active = 1", [], |row| {
                row.get(0)
            })
        })
    }

    /// Draw up to `n` distinct active users without an active relation to
    /// `slug`, uniformly at random. The ordering is server-side; callers
    /// must not rely on determinism.
    fn random_users_without_segment(&self, n: i64, slug: &str) -> SegmentatorResult<Vec<i64>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id FROM users u
                 WHERE u.is_active = 1
                   AND NOT EXISTS (
                       SELECT 1 FROM user_segment_relation r
                       WHERE r.user_id = u.id
                         AND r.is_active = 1
                         AND r.segment_id =
                             (SELECT id FROM segments WHERE slug = ?1 LIMIT 1)
                   )
                 ORDER BY RANDOM()
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![slug, n], |row| row.get::<_, i64>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SegmentCatalog;

    fn setup(active_users: i64, inactive_users: i64) -> (Arc<Db>, SegmentCatalog, RolloutSampler) {
        let db = Arc::new(Db::open_in_memory().unwrap());
        db.with_conn(|conn| {
            for id in 1..=active_users {
                conn.execute("INSERT INTO users (id, is_active) VALUES (?1, 1)", params![id])?;
            }
            for id in active_users + 1..=active_users + inactive_users {
                conn.execute("INSERT INTO users (id, is_active) VALUES (?1, 0)", params![id])?;
            }
            Ok(())
        })
        .unwrap();
        let catalog = SegmentCatalog::new(db.clone());
        let sampler = RolloutSampler::new(db.clone());
        (db, catalog, sampler)
    }

    fn assigned_count(db: &Db, slug: &str) -> i64 {
        db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM user_segment_relation r
                 JOIN segments s ON r.segment_id = s.id
                 WHERE s.slug = ?1 AND r.is_active = 1",
                params![slug],
                |row| row.get(0),
            )
        })
        .unwrap()
    }

    #[test]
    fn fraction_out_of_range_is_invalid_input() {
        let (_db, catalog, sampler) = setup(5, 0);
        catalog.create_or_reactivate("beta").unwrap();
        for bad in [0, -1, 101] {
            let err = sampler.auto_assign(bad, "beta", 0).unwrap_err();
            assert!(matches!(err, SegmentatorError::InvalidInput(_)));
        }
    }

    #[test]
    fn fifty_percent_of_ten_users_assigns_five() {
        let (db, catalog, sampler) = setup(10, 0);
        catalog.create_or_reactivate("beta").unwrap();
        let drawn = sampler.auto_assign(50, "beta", 0).unwrap();
        assert_eq!(drawn, 5);
        assert_eq!(assigned_count(&db, "beta"), 5);
    }

    #[test]
    fn ceiling_rounds_up_tiny_fractions() {
        // ceil(1 * 1 / 100) = 1
        let (db, catalog, sampler) = setup(1, 0);
        catalog.create_or_reactivate("beta").unwrap();
        assert_eq!(sampler.auto_assign(1, "beta", 0).unwrap(), 1);
        assert_eq!(assigned_count(&db, "beta"), 1);

        // ceil(150 * 1 / 100) = 2
        let (db, catalog, sampler) = setup(150, 0);
        catalog.create_or_reactivate("beta").unwrap();
        assert_eq!(sampler.auto_assign(1, "beta", 0).unwrap(), 2);
        assert_eq!(assigned_count(&db, "beta"), 2);
    }

    #[test]
    fn inactive_users_are_not_eligible() {
        let (db, catalog, sampler) = setup(4, 6);
        catalog.create_or_reactivate("beta").unwrap();
        // 100% of the 4 active users; the 6 inactive must stay untouched
        assert_eq!(sampler.auto_assign(100, "beta", 0).unwrap(), 4);
        assert_eq!(assigned_count(&db, "beta"), 4);
    }

    #[test]
    fn shortfall_is_partial_fulfillment() {
        let (db, catalog, sampler) = setup(10, 0);
        catalog.create_or_reactivate("beta").unwrap();
        // First rollout takes everyone; the sample size of the second exceeds
        // the now-empty eligible pool.
        sampler.auto_assign(100, "beta", 0).unwrap();
        let drawn = sampler.auto_assign(100, "beta", 0).unwrap();
        assert_eq!(drawn, 0);
        assert_eq!(assigned_count(&db, "beta"), 10);
    }

    #[test]
    fn rollout_never_duplicates_existing_holders() {
        let (db, catalog, sampler) = setup(10, 0);
        catalog.create_or_reactivate("beta").unwrap();
        sampler.auto_assign(50, "beta", 0).unwrap();
        sampler.auto_assign(50, "beta", 0).unwrap();
        // 5 + 5 distinct holders, one active relation each
        assert_eq!(assigned_count(&db, "beta"), 10);
        let max_per_user: i64 = db
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT MAX(n) FROM (
                         SELECT COUNT(*) AS n FROM user_segment_relation
                         WHERE is_active = 1 GROUP BY user_id
                     )",
                    [],
                    |row| row.get(0),
                )
            })
            .unwrap();
        assert_eq!(max_per_user, 1);
    }
}
