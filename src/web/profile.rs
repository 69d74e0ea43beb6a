use std::borrow::Cow;

use axum::{
    extract::{Form, Query, State},
    response::Html,
};
use axum_extra::extract::cookie::SignedCookieJar;
use serde::Deserialize;
use tracing::{error, info};
use validator::Validate;

use crate::web::{
    AppState,
    auth::{normalize_email, send_verification},
    csrf, data, escape_html,
    models::UserRow,
    responses::{Flash, FlashQuery, FlowError, FlowRedirect, FlowResult},
    session,
    templates::{PageLayout, render_page},
};

#[derive(Deserialize, Validate)]
pub struct EditProfileForm {
    #[serde(default)]
    #[validate(email)]
    pub email: String,
    pub csrf_token: Option<String>,
}

pub async fn profile_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(params): Query<FlashQuery>,
) -> FlowResult<(SignedCookieJar, Html<String>)> {
    let (jar, user) = session::require_account(&state, jar).await?;
    Ok((jar, Html(render_profile_page(&user, params.flash()))))
}

pub async fn edit_profile_page(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(params): Query<FlashQuery>,
) -> FlowResult<(SignedCookieJar, Html<String>)> {
    let (jar, user) = session::require_account(&state, jar).await?;
    let (jar, token) = csrf::ensure_token(jar);
    Ok((
        jar,
        Html(render_edit_profile_page(&user, &token, params.flash())),
    ))
}

/// Replaces the account email, clears verification and mails a link to the new address.
pub async fn process_edit_profile(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(mut form): Form<EditProfileForm>,
) -> FlowResult<(SignedCookieJar, FlowRedirect)> {
    let (jar, user) = session::require_account(&state, jar).await?;
    csrf::verify(&jar, form.csrf_token.as_deref(), "/edit_profile")?;

    form.email = normalize_email(&form.email);
    if form.validate().is_err() {
        return Err(FlowError::rejected("/edit_profile", Flash::InvalidEmail));
    }
    let new_email = form.email.as_str();

    match data::update_email(state.pool(), &user.username, new_email).await {
        Ok(_) => info!(user_id = user.id, "email changed, verification reset"),
        Err(err) if data::is_unique_violation(&err) => {
            return Err(FlowError::rejected("/edit_profile", Flash::EmailTaken));
        }
        Err(err) => return Err(err.into()),
    }

    let flash = match send_verification(&state, &user.username, new_email).await {
        Ok(()) => Flash::EmailUpdated,
        Err(err) => {
            error!(?err, user_id = user.id, "failed to send verification email");
            Flash::EmailUpdatedMailFailed
        }
    };

    Ok((jar, FlowRedirect::to("/profile").with_flash(flash)))
}

fn render_profile_page(user: &UserRow, flash: Option<Flash>) -> String {
    let status = if user.is_verified {
        "Verified"
    } else {
        "Awaiting verification"
    };

    let body = format!(
        r#"<section class="panel">
            <h1>Your profile</h1>
            <dl>
                <dt>Username</dt><dd>{username}</dd>
                <dt>Email</dt><dd>{email}</dd>
                <dt>Status</dt><dd>{status}</dd>
            </dl>
            <a href="/edit_profile"><button type="button">Change email</button></a>
        </section>"#,
        username = escape_html(&user.username),
        email = escape_html(&user.email),
    );

    render_page(PageLayout {
        title: "Profile",
        username: Some(&user.username),
        flash,
        body_html: Cow::Owned(body),
    })
}

fn render_edit_profile_page(user: &UserRow, csrf_token: &str, flash: Option<Flash>) -> String {
    let body = format!(
        r#"<section class="panel">
            <h1>Change email</h1>
            <p class="note">Changing your email address requires verifying it again.</p>
            <form method="post" action="/edit_profile">
                {csrf}
                <label for="email">Email</label>
                <input id="email" type="email" name="email" value="{email}" required>
                <button type="submit">Save</button>
            </form>
        </section>"#,
        csrf = csrf::hidden_field(csrf_token),
        email = escape_html(&user.email),
    );

    render_page(PageLayout {
        title: "Edit profile",
        username: Some(&user.username),
        flash,
        body_html: Cow::Owned(body),
    })
}
