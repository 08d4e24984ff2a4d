//! Report generation over the relation audit trail.
//!
//! Input dates are month-granular (`yyyy-mm` or `yyyy-m`). The window is
//! half-open: the end month is extended by one month and tested
//! exclusively, so `2023-1..2023-3` covers January through March.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Months, NaiveDate, Utc};
use rand::Rng;
use rusqlite::params;
use segmentator_core::config::ReportConfig;
use segmentator_core::types::{Operation, ReportRow};
use segmentator_core::{SegmentatorError, SegmentatorResult};
use segmentator_store::{encode_ts, Db};
use tracing::info;

const FILE_ID_LEN: usize = 10;
const FILE_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz1234567890";

/// Half-open month window: `start` inclusive bound, `end` already extended
/// one month past the requested end month and tested exclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Clone)]
pub struct HistoryReporter {
    db: Arc<Db>,
    cfg: ReportConfig,
}

impl HistoryReporter {
    pub fn new(db: Arc<Db>, cfg: ReportConfig) -> Self {
        Self { db, cfg }
    }

    /// Parse and validate a month-granular date range.
    pub fn parse_month_range(start: &str, end: &str) -> SegmentatorResult<MonthRange> {
        let start = parse_month(start)?;
        let end = parse_month(end)?;
        let end = end
            .checked_add_months(Months::new(1))
            .ok_or_else(|| SegmentatorError::InvalidInput("end date out of range".to_string()))?;
        Ok(MonthRange { start, end })
    }

    /// All assignment and unassignment events for one user that fall inside
    /// the window, read from the never-deleted relation rows.
    pub fn user_history(&self, user_id: i64, range: MonthRange) -> SegmentatorResult<Vec<ReportRow>> {
        let start = encode_ts(range.start);
        let end = encode_ts(range.end);

        let rows: Vec<(String, String, Option<String>)> = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.slug, r.date_assigned, r.date_unassigned
                 FROM user_segment_relation r
                 JOIN segments s ON r.segment_id = s.id
                 WHERE r.user_id = ?1
                   AND (r.date_assigned >= ?2
                        OR r.date_unassigned < ?3
                        OR r.date_unassigned IS NULL)
                 ORDER BY r.date_assigned",
            )?;
            let mapped = stmt.query_map(params![user_id, start, end], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            mapped.collect::<rusqlite::Result<Vec<_>>>()
        })?;

        // The SQL prefilter is broad; the exact window test happens here.
        // Fixed-width timestamps make string comparison chronological.
        let mut history = Vec::new();
        for (slug, assigned, unassigned) in rows {
            if start.as_str() < assigned.as_str() && assigned.as_str() < end.as_str() {
                history.push(ReportRow {
                    user_id,
                    segment: slug.clone(),
                    operation: Operation::Assigned,
                    date: assigned.clone(),
                });
            }
            if let Some(unassigned) = unassigned {
                if start.as_str() < unassigned.as_str() && unassigned.as_str() < end.as_str() {
                    history.push(ReportRow {
                        user_id,
                        segment: slug,
                        operation: Operation::Unassigned,
                        date: unassigned,
                    });
                }
            }
        }
        Ok(history)
    }

    /// Write the report as `user_id;segment;operation;date` lines into a
    /// randomly named file under the storage dir and return its public URL.
    pub fn write_csv(&self, history: &[ReportRow]) -> SegmentatorResult<String> {
        let mut rng = rand::thread_rng();
        let file_id: String = (0..FILE_ID_LEN)
            .map(|_| FILE_ID_ALPHABET[rng.gen_range(0..FILE_ID_ALPHABET.len())] as char)
            .collect();
        let file_name = format!("{}{}{}", self.cfg.file_prefix, file_id, self.cfg.file_ext);

        std::fs::create_dir_all(&self.cfg.storage_dir)?;
        let path = Path::new(&self.cfg.storage_dir).join(&file_name);

        let mut data = String::new();
        for row in history {
            data.push_str(&format!(
                "{};{};{};{}\n",
                row.user_id,
                row.segment,
                row.operation.as_str(),
                row.date
            ));
        }
        std::fs::write(&path, data)?;

        info!(file = %path.display(), rows = history.len(), "report written");
        Ok(format!(
            "{}/reports/{}",
            self.cfg.public_base_url.trim_end_matches('/'),
            file_name
        ))
    }
}

fn parse_month(input: &str) -> SegmentatorResult<DateTime<Utc>> {
    let bad = || {
        SegmentatorError::InvalidInput(format!(
            "date {input:?} must be yyyy-mm or yyyy-m"
        ))
    };

    let (year, month) = input.split_once('-').ok_or_else(bad)?;
    if year.len() != 4 || month.is_empty() || month.len() > 2 {
        return Err(bad());
    }
    let year: i32 = year.parse().map_err(|_| bad())?;
    let month: u32 = month.parse().map_err(|_| bad())?;

    let date = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(bad)?;
    let naive = date.and_hms_opt(0, 0, 0).ok_or_else(bad)?;
    Ok(naive.and_utc())
}
