use std::borrow::Cow;

use anyhow::Context;
use axum::{
    extract::{Multipart, Path, Query, State},
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::SignedCookieJar;
use tracing::{info, warn};

use crate::{
    classifier::Prediction,
    web::{
        AppState, csrf, escape_html,
        models::UserRow,
        responses::{Flash, FlashQuery, FlowError, FlowResult},
        session,
        storage::{not_found, serve_file},
        templates::{PageLayout, render_page},
        uploads::{self, IMAGE_FIELD, sanitized_name},
    },
};

pub async fn detect_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(params): Query<FlashQuery>,
) -> FlowResult<(SignedCookieJar, Html<String>)> {
    let (jar, user) = session::require_account(&state, jar).await?;
    let (jar, token) = csrf::ensure_token(jar);
    Ok((jar, Html(render_detect_page(&user, &token, params.flash()))))
}

/// Stores the submitted image in the caller's upload directory and classifies it.
pub async fn process_detect(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    multipart: Multipart,
) -> FlowResult<(SignedCookieJar, Html<String>)> {
    let (jar, user) = session::require_account(&state, jar).await?;

    let form = uploads::read_image_form(multipart).await.map_err(|err| {
        warn!(%err, user_id = user.id, "rejected detection upload");
        FlowError::rejected("/detect", Flash::UploadFailed)
    })?;
    csrf::verify(&jar, form.csrf_token.as_deref(), "/detect")?;

    let Some(image) = form.image else {
        return Err(FlowError::rejected("/detect", Flash::NoImage));
    };

    let saved = uploads::store_image(&state.user_upload_dir(user.id), &image)
        .await
        .context("failed to persist uploaded image")?;
    let prediction = state
        .classifier()
        .predict(&saved.stored_path)
        .await
        .with_context(|| format!("failed to classify {}", saved.stored_path.display()))?;

    info!(
        user_id = user.id,
        file = %saved.stored_name,
        bytes = saved.file_size,
        label = prediction.class.label(),
        confidence = prediction.confidence,
        "lesion classified"
    );

    Ok((
        jar,
        Html(render_result_page(&user, &saved.stored_name, &prediction)),
    ))
}

/// Serves one of the caller's own uploads.
pub async fn uploaded_file(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Path(filename): Path<String>,
) -> FlowResult<Response> {
    let (jar, user) = session::require_account(&state, jar).await?;

    if sanitized_name(&filename) != filename {
        return Ok((jar, not_found()).into_response());
    }

    let path = state.user_upload_dir(user.id).join(&filename);
    Ok((jar, serve_file(&path).await).into_response())
}

fn render_detect_page(user: &UserRow, csrf_token: &str, flash: Option<Flash>) -> String {
    let body = format!(
        r#"<section class="panel">
            <h1>Skin lesion detection</h1>
            <p class="note">Upload a clear, well-lit photo of the lesion. JPEG, PNG, BMP, GIF and WebP are supported.</p>
            <form method="post" action="/detect" enctype="multipart/form-data">
                {csrf}
                <label for="{field}">Image</label>
                <input id="{field}" type="file" name="{field}" accept="image/*" required>
                <button type="submit">Analyse</button>
            </form>
        </section>"#,
        csrf = csrf::hidden_field(csrf_token),
        field = IMAGE_FIELD,
    );

    render_page(PageLayout {
        title: "Detect",
        username: Some(&user.username),
        flash,
        body_html: Cow::Owned(body),
    })
}

fn render_result_page(user: &UserRow, stored_name: &str, prediction: &Prediction) -> String {
    let body = format!(
        r#"<section class="panel">
            <h1>Result</h1>
            <img src="/uploads/{src}" alt="Uploaded lesion" style="max-width:100%; border-radius:12px;">
            <dl>
                <dt>Prediction</dt><dd>{label}</dd>
                <dt>Confidence</dt><dd>{confidence:.2}%</dd>
            </dl>
            <p class="note">This estimate is produced by an image classifier and is not a medical diagnosis.</p>
            <a href="/detect"><button type="button">Analyse another image</button></a>
        </section>"#,
        src = escape_html(&percent_encode_path_segment(stored_name)),
        label = escape_html(&prediction.class.label().replace('_', " ")),
        confidence = prediction.confidence,
    );

    render_page(PageLayout {
        title: "Result",
        username: Some(&user.username),
        flash: None,
        body_html: Cow::Owned(body),
    })
}

fn percent_encode_path_segment(segment: &str) -> String {
    segment
        .bytes()
        .map(|byte| match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (byte as char).to_string()
            }
            other => format!("%{other:02X}"),
        })
        .collect()
}
