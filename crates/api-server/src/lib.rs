//! REST surface of the segmentator service.

pub mod rest;
pub mod server;

pub use rest::AppState;
pub use server::ApiServer;
