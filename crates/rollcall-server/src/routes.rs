pub mod accounts;
pub mod attendance;
pub mod dashboard;
pub mod identify;
pub mod verify;
pub mod ws;

use crate::error::AppError;
use crate::state::SharedState;
use axum::extract::{FromRequest, State};
use axum::Json;
use serde::Serialize;

/// JSON body extractor whose rejections use the service's error body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, Serialize)]
pub struct Status {
    pub service: &'static str,
    pub version: &'static str,
    pub model_version: String,
    pub templates: usize,
    pub rooms: usize,
}

pub async fn status(State(state): State<SharedState>) -> Json<Status> {
    Json(Status {
        service: "rollcall",
        version: env!("CARGO_PKG_VERSION"),
        model_version: state.engine.model_version().to_string(),
        templates: state.gallery.len().await,
        rooms: state.rooms.room_count(),
    })
}
