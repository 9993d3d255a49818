use super::ApiJson;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::faces;
use crate::gallery::Identification;
use crate::state::SharedState;
use axum::extract::State;
use axum::Json;
use rollcall_core::BoundingBox;
use rollcall_store::Role;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IdentifyForm {
    pub face_image: String,
}

#[derive(Debug, Serialize)]
pub struct IdentifiedFace {
    #[serde(flatten)]
    pub identity: Identification,
    pub face: BoundingBox,
}

#[derive(Debug, Serialize)]
pub struct IdentifyReply {
    pub success: bool,
    pub faces: Vec<IdentifiedFace>,
}

/// 1:N search of every face in the capture over all stored templates.
pub async fn identify(
    State(state): State<SharedState>,
    user: CurrentUser,
    ApiJson(form): ApiJson<IdentifyForm>,
) -> Result<Json<IdentifyReply>, AppError> {
    user.require(Role::Faculty)?;
    if form.face_image.trim().is_empty() {
        return Err(AppError::BadRequest("Please capture a face image".to_string()));
    }

    let captures = match faces::decode_face_image(&state, &form.face_image)? {
        Some(image) => state.engine.encode_all(image).await?,
        None => Vec::new(),
    };

    let mut found = Vec::with_capacity(captures.len());
    for capture in captures {
        let identity = state
            .gallery
            .identify(&capture.embedding, state.config.identify_threshold)
            .await;
        found.push(IdentifiedFace {
            identity,
            face: capture.face,
        });
    }

    tracing::info!(
        by = %user.0.reg_id,
        faces = found.len(),
        matched = found.iter().filter(|f| f.identity.matched).count(),
        "identify"
    );
    Ok(Json(IdentifyReply {
        success: true,
        faces: found,
    }))
}
