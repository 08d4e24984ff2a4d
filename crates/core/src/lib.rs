//! Shared foundation for the segmentator service — configuration, error
//! taxonomy, and the request/response types exchanged at the API boundary.

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{SegmentatorError, SegmentatorResult};
