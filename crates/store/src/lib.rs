//! SQLite-backed relational store for the segmentator service.
//!
//! The store owns connection management, schema bootstrap, and transaction
//! boundaries. Domain logic lives in `segmentator-segments`; this crate only
//! guarantees that multi-statement sequences commit or roll back as a unit.

pub mod db;
pub mod schema;

pub use db::{decode_ts, encode_ts, store_err, Db, TS_FORMAT};
