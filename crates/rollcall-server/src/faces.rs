//! Face checks shared by the HTTP and WebSocket handlers.

use crate::error::AppError;
use crate::state::AppState;
use image::RgbImage;
use rollcall_core::capture::decode_capture;
use rollcall_core::{CaptureError, DistanceMatcher, FaceCapture, Matcher};

/// Verdict of checking a capture against one account's stored template.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FaceCheck {
    NoTemplate,
    NoFace,
    Mismatch { distance: Option<f32> },
    Match { distance: f32 },
}

impl FaceCheck {
    pub fn passed(&self) -> bool {
        matches!(self, FaceCheck::Match { .. })
    }
}

/// Decode a browser capture. A dark frame decodes to `None` (nothing to see).
pub fn decode_face_image(state: &AppState, data_url: &str) -> Result<Option<RgbImage>, AppError> {
    let payload = data_url.split_once(',').map_or(data_url, |(_, rest)| rest);
    if payload.trim().len() / 4 * 3 > state.config.max_image_bytes {
        return Err(AppError::PayloadTooLarge);
    }

    match decode_capture(data_url, state.config.max_decoded_bytes()) {
        Ok(image) => Ok(Some(image)),
        Err(CaptureError::TooLarge(limit)) => {
            tracing::debug!(limit, "capture decodes past the pixel budget");
            Err(AppError::PayloadTooLarge)
        }
        Err(CaptureError::TooDark) => {
            tracing::debug!("capture too dark, treating as no face");
            Ok(None)
        }
        Err(e) => {
            tracing::debug!(error = %e, "rejected capture");
            Err(AppError::BadRequest("Invalid image".to_string()))
        }
    }
}

/// The best face in a browser capture, if any.
pub async fn encode_face(state: &AppState, data_url: &str) -> Result<Option<FaceCapture>, AppError> {
    let Some(image) = decode_face_image(state, data_url)? else {
        return Ok(None);
    };
    Ok(state.engine.encode(image).await?)
}

/// Compare a capture with the stored template of `reg_id`.
pub async fn check_face(state: &AppState, reg_id: &str, data_url: &str) -> Result<FaceCheck, AppError> {
    let Some(stored) = state.store.get_face_encoding(reg_id).await? else {
        return Ok(FaceCheck::NoTemplate);
    };
    let Some(probe) = encode_face(state, data_url).await? else {
        return Ok(FaceCheck::NoFace);
    };

    let distance = probe.embedding.euclidean_distance(&stored);
    let check = match distance {
        Some(d) if DistanceMatcher.verify(&probe.embedding, &stored, state.config.verify_tolerance) => {
            FaceCheck::Match { distance: d }
        }
        _ => FaceCheck::Mismatch { distance },
    };
    tracing::debug!(reg_id, ?check, "face check");
    Ok(check)
}
