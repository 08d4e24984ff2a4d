//! Segment assignment core — catalog CRUD, the assignment engine,
//! percentage-based auto-rollout, and the TTL sweeper.

pub mod assignment;
pub mod catalog;
pub mod rollout;
pub mod sweeper;

pub use assignment::AssignmentEngine;
pub use catalog::SegmentCatalog;
pub use rollout::RolloutSampler;
pub use sweeper::{SweeperHandle, TtlSweeper};
