use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::state::SharedState;
use axum::extract::State;
use axum::Json;
use rollcall_store::{AttendanceRecord, Role, User};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub success: bool,
    pub user: User,
    /// Faculty: marks they collected. Students: their own history. Newest first.
    pub attendance: Vec<AttendanceRecord>,
}

pub async fn dashboard(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Dashboard>, AppError> {
    let attendance = match user.role {
        Role::Faculty => state.store.attendance_for_faculty(&user.reg_id).await?,
        Role::Student => state.store.attendance_for_student(&user.reg_id).await?,
    };
    Ok(Json(Dashboard {
        success: true,
        user,
        attendance,
    }))
}
