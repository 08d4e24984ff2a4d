//! Schema bootstrap. Tables are created on first open; there is no
//! migration machinery, matching the service's fixed relation layout.
//!
//! `users` is owned externally — the service only reads it. It is created
//! here so a fresh database is immediately usable by tests and tooling.

use rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id          INTEGER PRIMARY KEY,
    is_active   INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS segments (
    id          INTEGER PRIMARY KEY,
    slug        TEXT NOT NULL UNIQUE,
    is_active   INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS user_segment_relation (
    id              INTEGER PRIMARY KEY,
    user_id         INTEGER NOT NULL REFERENCES users (id),
    segment_id      INTEGER NOT NULL REFERENCES segments (id),
    is_active       INTEGER NOT NULL DEFAULT 1,
    date_assigned   TEXT NOT NULL,
    date_unassigned TEXT
);

CREATE INDEX IF NOT EXISTS idx_relation_pair
    ON user_segment_relation (user_id, segment_id, is_active);

CREATE INDEX IF NOT EXISTS idx_relation_deadline
    ON user_segment_relation (date_unassigned)
    WHERE is_active = 1 AND date_unassigned IS NOT NULL;
";

pub fn bootstrap(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}
