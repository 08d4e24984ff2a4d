//! Request and response bodies exchanged at the API boundary.
//!
//! Each endpoint declares its own request type with only the fields it
//! actually consumes; optional fields default rather than error.

use serde::{Deserialize, Serialize};

/// POST /api/create_segment
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSegmentRequest {
    pub segment_slug: String,
    /// Percentage of the active user population to auto-assign, 1..=100.
    /// Absent or zero means no rollout.
    #[serde(default)]
    pub fraction: i64,
    /// TTL in calendar days for auto-assigned relations. Zero means none.
    #[serde(default)]
    pub ttl: i64,
}

/// DELETE /api/delete_segment
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteSegmentRequest {
    pub segment_slug: String,
}

/// POST /api/update_user_segments
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateUserSegmentsRequest {
    pub user_id: i64,
    #[serde(default)]
    pub assign_segments: Vec<String>,
    #[serde(default)]
    pub unassign_segments: Vec<String>,
    /// TTL in calendar days applied to assignments in this call. Zero means
    /// the relations never expire on their own.
    #[serde(default)]
    pub ttl: i64,
}

/// GET /api/get_user_segments query parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct UserSegmentsQuery {
    pub user_id: i64,
}

/// GET /api/get_user_history query parameters. Dates are month-granular,
/// `yyyy-mm` or `yyyy-m`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserHistoryQuery {
    pub user_id: i64,
    pub start_date: String,
    pub end_date: String,
}

/// Response body for /api/get_user_segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSegments {
    pub user_id: i64,
    pub segments: Vec<String>,
}

/// Response body for /api/get_user_history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportResponse {
    pub csv_url: String,
}

/// One line of a history report: a single assignment or unassignment event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub user_id: i64,
    pub segment: String,
    pub operation: Operation,
    pub date: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Assigned,
    Unassigned,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Assigned => "assigned",
            Operation::Unassigned => "unassigned",
        }
    }
}
