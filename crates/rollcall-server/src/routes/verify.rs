//! Stand-alone face checks used by the browser before marking attendance.
//!
//! A failed check is a normal answer (`200` with `success: false`); only a
//! malformed request is an error.

use super::ApiJson;
use crate::error::AppError;
use crate::faces::{self, FaceCheck};
use crate::state::SharedState;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QrFaceForm {
    pub reg_id: String,
    pub face_image: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AttendanceFaceForm {
    pub student_reg_id: String,
    pub face_image: String,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct VerifyReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

impl VerifyReply {
    fn ok() -> Self {
        Self { success: true, error: None }
    }

    fn failed(error: &'static str) -> Self {
        Self {
            success: false,
            error: Some(error),
        }
    }
}

fn missing_fields() -> AppError {
    AppError::BadRequest("Missing fields".to_string())
}

pub async fn verify_face_for_qr(
    State(state): State<SharedState>,
    ApiJson(form): ApiJson<QrFaceForm>,
) -> Result<Json<VerifyReply>, AppError> {
    let reg_id = form.reg_id.trim();
    if reg_id.is_empty() || form.face_image.trim().is_empty() {
        return Err(missing_fields());
    }

    let check = faces::check_face(&state, reg_id, &form.face_image).await?;
    Ok(Json(if check.passed() {
        VerifyReply::ok()
    } else {
        VerifyReply::failed("Face verification failed")
    }))
}

pub async fn verify_face_for_attendance(
    State(state): State<SharedState>,
    ApiJson(form): ApiJson<AttendanceFaceForm>,
) -> Result<Json<VerifyReply>, AppError> {
    let reg_id = form.student_reg_id.trim();
    if reg_id.is_empty() || form.face_image.trim().is_empty() {
        return Err(missing_fields());
    }

    let reply = match faces::check_face(&state, reg_id, &form.face_image).await? {
        FaceCheck::Match { .. } => VerifyReply::ok(),
        FaceCheck::NoTemplate => VerifyReply::failed("No face encoding found in DB."),
        FaceCheck::NoFace => VerifyReply::failed("No face detected in image."),
        FaceCheck::Mismatch { .. } => VerifyReply::failed("Face does not match our records."),
    };
    Ok(Json(reply))
}
