use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Faculty,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Faculty => "faculty",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0} (expected student or faculty)")]
pub struct ParseRoleError(pub String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "faculty" => Ok(Role::Faculty),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

/// A registered account.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub role: Role,
    pub name: String,
    pub reg_id: String,
    pub email: String,
    pub mobile: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new account; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub role: Role,
    pub name: String,
    pub reg_id: String,
    pub email: String,
    pub mobile: Option<String>,
    pub password_hash: String,
}

/// One stored attendance mark.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub student_reg_id: String,
    /// Present when the student account still exists.
    pub student_name: Option<String>,
    pub faculty_reg_id: String,
    pub subject: String,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of marking attendance.
#[derive(Debug, Clone, PartialEq)]
pub enum AttendanceOutcome {
    Recorded(AttendanceRecord),
    /// Already marked today for this faculty member and subject.
    Duplicate,
}

/// Row counts for status reporting.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StoreCounts {
    pub users: i64,
    pub templates: i64,
    pub attendance: i64,
}

pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_role(idx: usize, raw: &str) -> rusqlite::Result<Role> {
    raw.parse()
        .map_err(|e: ParseRoleError| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// UTC calendar day used for attendance dedupe.
pub(crate) fn day_key(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_role_parse() {
        assert_eq!("Faculty".parse::<Role>().unwrap(), Role::Faculty);
        assert_eq!(" student ".parse::<Role>().unwrap(), Role::Student);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 9, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 1, 10, 8, 0, 0).unwrap();
        assert!(format_ts(&a) < format_ts(&b));
        assert_eq!(parse_ts(0, &format_ts(&a)).unwrap(), a);
    }

    #[test]
    fn test_day_key() {
        let t = Utc.with_ymd_and_hms(2026, 3, 4, 23, 59, 59).unwrap();
        assert_eq!(day_key(&t), "2026-03-04");
    }

    #[test]
    fn test_user_json_hides_password_hash() {
        let user = User {
            id: 1,
            role: Role::Student,
            name: "Asha".into(),
            reg_id: "S1".into(),
            email: "asha@campus.edu".into(),
            mobile: None,
            password_hash: "$2b$secret".into(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "student");
    }
}
