use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use crate::web::{AppState, auth, detect, landing, profile};

/// Request body ceiling, sized for phone-camera photos.
pub const UPLOAD_BODY_LIMIT: usize = 16 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing::landing_page))
        .route(
            "/register",
            get(auth::register_page).post(auth::process_register),
        )
        .route("/confirm/:token", get(auth::confirm_email))
        .route("/login", get(auth::login_page).post(auth::process_login))
        .route("/logout", get(auth::logout))
        .route("/profile", get(profile::profile_page))
        .route(
            "/edit_profile",
            get(profile::edit_profile_page).post(profile::process_edit_profile),
        )
        .route(
            "/detect",
            get(detect::detect_page).post(detect::process_detect),
        )
        .route("/uploads/:filename", get(detect::uploaded_file))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}
