//! History reporting — consumes the relation audit trail to produce
//! per-user CSV exports over a month-granular date range.

pub mod report;

pub use report::{HistoryReporter, MonthRange};
