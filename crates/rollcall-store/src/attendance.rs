use crate::models::{day_key, format_ts, parse_ts, AttendanceOutcome, AttendanceRecord};
use crate::{Result, Store};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

const RECORD_SELECT: &str = "SELECT a.id, a.student_reg_id, u.name, a.faculty_reg_id, a.subject, a.timestamp
     FROM attendance a LEFT JOIN users u ON u.reg_id = a.student_reg_id";

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let ts: String = row.get(5)?;
    Ok(AttendanceRecord {
        id: row.get(0)?,
        student_reg_id: row.get(1)?,
        student_name: row.get(2)?,
        faculty_reg_id: row.get(3)?,
        subject: row.get(4)?,
        timestamp: parse_ts(5, &ts)?,
    })
}

impl Store {
    /// Mark a student present for a faculty member's subject.
    ///
    /// At most one mark per (student, faculty, subject) per UTC day; a repeat
    /// yields [`AttendanceOutcome::Duplicate`] and leaves the first mark intact.
    pub async fn record_attendance(
        &self,
        student_reg_id: &str,
        faculty_reg_id: &str,
        subject: &str,
        at: DateTime<Utc>,
    ) -> Result<AttendanceOutcome> {
        let (student, faculty, owned_subject) = (
            student_reg_id.to_string(),
            faculty_reg_id.to_string(),
            subject.to_string(),
        );

        let outcome = self
            .conn
            .call(move |conn| {
                let inserted = conn.execute(
                    "INSERT OR IGNORE INTO attendance (student_reg_id, faculty_reg_id, subject, timestamp, day)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![student, faculty, owned_subject, format_ts(&at), day_key(&at)],
                )?;
                if inserted == 0 {
                    return Ok(AttendanceOutcome::Duplicate);
                }

                let id = conn.last_insert_rowid();
                let record = conn.query_row(
                    &format!("{RECORD_SELECT} WHERE a.id = ?1"),
                    params![id],
                    record_from_row,
                )?;
                Ok(AttendanceOutcome::Recorded(record))
            })
            .await?;

        match &outcome {
            AttendanceOutcome::Recorded(r) => tracing::info!(
                student = %r.student_reg_id,
                faculty = %r.faculty_reg_id,
                subject = %r.subject,
                "attendance recorded"
            ),
            AttendanceOutcome::Duplicate => tracing::info!(
                student = student_reg_id,
                faculty = faculty_reg_id,
                subject,
                "duplicate attendance ignored"
            ),
        }
        Ok(outcome)
    }

    /// Marks taken by one faculty member, newest first.
    pub async fn attendance_for_faculty(&self, faculty_reg_id: &str) -> Result<Vec<AttendanceRecord>> {
        self.attendance_where("a.faculty_reg_id = ?1", faculty_reg_id).await
    }

    /// Marks of one student, newest first.
    pub async fn attendance_for_student(&self, student_reg_id: &str) -> Result<Vec<AttendanceRecord>> {
        self.attendance_where("a.student_reg_id = ?1", student_reg_id).await
    }

    async fn attendance_where(&self, filter: &'static str, reg_id: &str) -> Result<Vec<AttendanceRecord>> {
        let reg_id = reg_id.to_string();
        let records = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{RECORD_SELECT} WHERE {filter} ORDER BY a.timestamp DESC, a.id DESC"
                ))?;
                let records = stmt
                    .query_map(params![reg_id], record_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(records)
            })
            .await?;
        Ok(records)
    }
}
