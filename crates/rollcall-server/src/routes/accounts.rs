use super::ApiJson;
use crate::auth;
use crate::error::AppError;
use crate::faces;
use crate::state::SharedState;
use axum::extract::State;
use axum::http::{header::SET_COOKIE, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use rollcall_core::FaceTemplate;
use rollcall_store::{NewUser, Role, StoreError, User};
use serde::{Deserialize, Serialize};
use serde_json::json;

const FILL_ALL_FIELDS: &str = "Please fill all fields and capture your face";
const USER_EXISTS: &str = "User already exists";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignupForm {
    pub role: String,
    pub name: String,
    pub reg_id: String,
    pub email: String,
    pub mobile: Option<String>,
    pub password: String,
    pub face_image: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub role: String,
    pub reg_id: String,
    pub password: String,
    pub face_image: String,
}

#[derive(Debug, Serialize)]
pub struct LoginReply {
    pub success: bool,
    pub message: &'static str,
    pub user: User,
}

fn parse_role(raw: &str) -> Result<Role, AppError> {
    raw.parse().map_err(|_| AppError::BadRequest("Invalid role".to_string()))
}

pub async fn signup(
    State(state): State<SharedState>,
    ApiJson(form): ApiJson<SignupForm>,
) -> Result<impl IntoResponse, AppError> {
    let (name, reg_id, email) = (form.name.trim(), form.reg_id.trim(), form.email.trim());
    let mobile = form.mobile.as_deref().map(str::trim).filter(|m| !m.is_empty());
    if [form.role.trim(), name, reg_id, email, form.password.as_str(), form.face_image.trim()]
        .iter()
        .any(|f| f.is_empty())
    {
        return Err(AppError::BadRequest(FILL_ALL_FIELDS.to_string()));
    }
    let role = parse_role(&form.role)?;

    if state.store.user_exists(reg_id, email).await? {
        return Err(AppError::Conflict(USER_EXISTS.to_string()));
    }

    let Some(capture) = faces::encode_face(&state, &form.face_image).await? else {
        tracing::info!(reg_id, "signup rejected: no face in capture");
        return Err(AppError::Unprocessable("No face detected. Signup failed.".to_string()));
    };

    let password_hash = auth::hash_password(form.password.clone(), state.config.bcrypt_cost).await?;
    let new_user = NewUser {
        role,
        name: name.to_string(),
        reg_id: reg_id.to_string(),
        email: email.to_string(),
        mobile: mobile.map(str::to_string),
        password_hash,
    };

    let user = match state.store.register_user(new_user, &capture.embedding).await {
        Err(StoreError::Conflict) => return Err(AppError::Conflict(USER_EXISTS.to_string())),
        other => other?,
    };
    state
        .gallery
        .upsert(FaceTemplate {
            reg_id: user.reg_id.clone(),
            name: user.name.clone(),
            role: user.role.to_string(),
            embedding: capture.embedding,
        })
        .await;

    tracing::info!(reg_id = %user.reg_id, role = %user.role, "signup complete");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": "Signup successful! Please login." })),
    ))
}

pub async fn login(
    State(state): State<SharedState>,
    ApiJson(form): ApiJson<LoginForm>,
) -> Result<impl IntoResponse, AppError> {
    let not_found = || AppError::NotFound("User not found".to_string());
    let role = parse_role(&form.role).map_err(|_| not_found())?;
    let user = state
        .store
        .find_user(form.reg_id.trim(), role)
        .await?
        .ok_or_else(not_found)?;

    if !auth::verify_password(form.password.clone(), user.password_hash.clone()).await? {
        tracing::info!(reg_id = %user.reg_id, "login rejected: bad password");
        return Err(AppError::Unauthorized("Incorrect password".to_string()));
    }
    if form.face_image.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Please capture your face for verification".to_string(),
        ));
    }

    let check = faces::check_face(&state, &user.reg_id, &form.face_image).await?;
    if !check.passed() {
        tracing::info!(reg_id = %user.reg_id, ?check, "login rejected: face");
        return Err(AppError::Unauthorized("Face verification failed".to_string()));
    }

    let token = state.store.create_session(user.id, state.config.session_ttl()).await?;
    let cookie = auth::session_cookie(&token, state.config.session_ttl_secs, state.config.cookie_secure);
    tracing::info!(reg_id = %user.reg_id, role = %user.role, "login");

    Ok((
        [(SET_COOKIE, cookie)],
        Json(LoginReply {
            success: true,
            message: "Login successful!",
            user,
        }),
    ))
}

pub async fn logout(State(state): State<SharedState>, headers: HeaderMap) -> Result<impl IntoResponse, AppError> {
    if let Some(token) = auth::session_token(&headers) {
        state.store.delete_session(&token).await?;
    }
    Ok((
        [(SET_COOKIE, auth::clear_session_cookie(state.config.cookie_secure))],
        Json(json!({ "success": true, "message": "Logged out" })),
    ))
}
