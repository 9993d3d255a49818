//! SQLite schema, applied idempotently on open.

pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    role          TEXT NOT NULL CHECK (role IN ('student', 'faculty')),
    name          TEXT NOT NULL,
    reg_id        TEXT NOT NULL UNIQUE,
    email         TEXT NOT NULL UNIQUE,
    mobile        TEXT,
    password_hash TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS face_encodings (
    reg_id        TEXT PRIMARY KEY REFERENCES users(reg_id) ON DELETE CASCADE,
    encoding_blob BLOB NOT NULL,
    model_version TEXT,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attendance (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    student_reg_id TEXT NOT NULL REFERENCES users(reg_id),
    faculty_reg_id TEXT NOT NULL REFERENCES users(reg_id),
    subject        TEXT NOT NULL,
    timestamp      TEXT NOT NULL,
    day            TEXT NOT NULL,
    UNIQUE (student_reg_id, faculty_reg_id, subject, day)
);

CREATE INDEX IF NOT EXISTS attendance_by_faculty ON attendance (faculty_reg_id, timestamp);
CREATE INDEX IF NOT EXISTS attendance_by_student ON attendance (student_reg_id, timestamp);

CREATE TABLE IF NOT EXISTS sessions (
    token      TEXT PRIMARY KEY,
    user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    expires_at TEXT NOT NULL
);
"#;
