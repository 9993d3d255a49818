//! QR issue and attendance marking.

use super::ApiJson;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::faces::{self, FaceCheck};
use crate::rooms::WsEvent;
use crate::state::{AppState, SharedState};
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use rollcall_store::{AttendanceOutcome, AttendanceRecord, Role, User};
use serde::{Deserialize, Serialize};

/// Timestamp layout shown in live feeds.
const FEED_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QrForm {
    pub subject: String,
}

/// What the student's QR scan yields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrPayload {
    pub faculty_reg_id: String,
    pub subject: String,
}

#[derive(Debug, Serialize)]
pub struct QrReply {
    pub success: bool,
    pub qr: QrPayload,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AttendanceForm {
    pub faculty_reg_id: String,
    pub subject: String,
    pub face_image: String,
}

/// Payload of the `attendance` room event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceEvent {
    pub student_reg_id: String,
    pub student_name: String,
    pub subject: String,
    pub timestamp: String,
}

impl AttendanceEvent {
    fn from_record(record: &AttendanceRecord, fallback_name: &str) -> Self {
        Self {
            student_reg_id: record.student_reg_id.clone(),
            student_name: record
                .student_name
                .clone()
                .unwrap_or_else(|| fallback_name.to_string()),
            subject: record.subject.clone(),
            timestamp: record.timestamp.format(FEED_TIME_FORMAT).to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AttendanceAck {
    pub success: bool,
    pub duplicate: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance: Option<AttendanceEvent>,
}

pub async fn qr(user: CurrentUser, ApiJson(form): ApiJson<QrForm>) -> Result<Json<QrReply>, AppError> {
    let faculty = user.require(Role::Faculty)?;
    let subject = form.subject.trim();
    if subject.is_empty() {
        return Err(AppError::BadRequest("Subject is required".to_string()));
    }

    tracing::info!(faculty = %faculty.reg_id, subject, "attendance QR issued");
    Ok(Json(QrReply {
        success: true,
        qr: QrPayload {
            faculty_reg_id: faculty.reg_id.clone(),
            subject: subject.to_string(),
        },
    }))
}

pub async fn submit(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    ApiJson(form): ApiJson<AttendanceForm>,
) -> Result<Json<AttendanceAck>, AppError> {
    Ok(Json(mark_attendance(&state, &user, form).await?))
}

/// Verify the student's face, store the mark and notify the faculty's room.
///
/// Nothing is stored or broadcast unless the face matches. A repeat mark on
/// the same day is acknowledged as a duplicate and not broadcast again.
pub async fn mark_attendance(state: &AppState, student: &User, form: AttendanceForm) -> Result<AttendanceAck, AppError> {
    if student.role != Role::Student {
        return Err(AppError::Forbidden("Only students can mark attendance".to_string()));
    }
    let (faculty_reg_id, subject) = (form.faculty_reg_id.trim(), form.subject.trim());
    if faculty_reg_id.is_empty() || subject.is_empty() {
        return Err(AppError::BadRequest("Missing fields".to_string()));
    }
    if form.face_image.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Please capture your face for verification".to_string(),
        ));
    }
    if state.store.find_user(faculty_reg_id, Role::Faculty).await?.is_none() {
        return Err(AppError::NotFound("Unknown faculty".to_string()));
    }

    match faces::check_face(state, &student.reg_id, &form.face_image).await? {
        FaceCheck::Match { .. } => {}
        FaceCheck::NoTemplate => {
            return Err(AppError::Unprocessable("No face encoding found in DB.".to_string()))
        }
        FaceCheck::NoFace => {
            return Err(AppError::Unprocessable("No face detected in image.".to_string()))
        }
        FaceCheck::Mismatch { distance } => {
            tracing::info!(student = %student.reg_id, ?distance, "attendance rejected: face mismatch");
            return Err(AppError::Unauthorized("Face does not match our records.".to_string()));
        }
    }

    let outcome = state
        .store
        .record_attendance(&student.reg_id, faculty_reg_id, subject, Utc::now())
        .await?;

    let record = match outcome {
        AttendanceOutcome::Duplicate => {
            return Ok(AttendanceAck {
                success: true,
                duplicate: true,
                message: "Attendance already marked",
                attendance: None,
            })
        }
        AttendanceOutcome::Recorded(record) => record,
    };

    let event = AttendanceEvent::from_record(&record, &student.name);
    let delivered = state
        .rooms
        .publish(&record.faculty_reg_id, WsEvent::new("attendance", &event));
    tracing::debug!(room = %record.faculty_reg_id, delivered, "attendance broadcast");

    Ok(AttendanceAck {
        success: true,
        duplicate: false,
        message: "Attendance marked",
        attendance: Some(event),
    })
}
