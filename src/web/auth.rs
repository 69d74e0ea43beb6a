use anyhow::{Result, anyhow};
use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum::{
    extract::{Form, Path, Query, State},
    response::{Html, Redirect},
};
use axum_extra::extract::cookie::SignedCookieJar;
use rand_core::OsRng;
use serde::Deserialize;
use tracing::{error, info, warn};
use validator::Validate;

use crate::web::{
    AppState, csrf, data,
    responses::{Flash, FlashQuery, FlowError, FlowRedirect, FlowResult},
    session,
    templates::{render_login_page, render_register_page},
    tokens::CONFIRMATION_MAX_AGE_SECS,
};

#[derive(Deserialize, Validate)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub csrf_token: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub csrf_token: Option<String>,
}

pub async fn register_page(
    jar: SignedCookieJar,
    Query(params): Query<FlashQuery>,
) -> Result<(SignedCookieJar, Html<String>), Redirect> {
    if let Some(redirect) = redirect_if_authenticated(&jar) {
        return Err(redirect);
    }

    let (jar, token) = csrf::ensure_token(jar);
    let page = render_register_page(&token, params.flash());
    Ok((jar, Html(page)))
}

pub async fn process_register(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(mut form): Form<RegisterForm>,
) -> FlowResult<FlowRedirect> {
    csrf::verify(&jar, form.csrf_token.as_deref(), "/register")?;

    form.email = normalize_email(&form.email);
    let username = form.username.trim();
    let email = form.email.as_str();
    let password = form.password.trim();

    if username.is_empty() || email.is_empty() || password.is_empty() {
        return Err(FlowError::rejected("/register", Flash::MissingFields));
    }
    if let Err(err) = form.validate() {
        info!(%err, "rejected registration email");
        return Err(FlowError::rejected("/register", Flash::InvalidEmail));
    }

    let password_hash =
        hash_password(password).map_err(|err| anyhow!("failed to hash password: {err}"))?;

    match data::insert_user(state.pool(), username, email, &password_hash).await {
        Ok(user_id) => info!(user_id, %username, "registered user"),
        Err(err) if data::is_unique_violation(&err) => {
            return Err(FlowError::rejected("/register", Flash::AlreadyExists));
        }
        Err(err) => return Err(err.into()),
    }

    let flash = match send_verification(&state, username, email).await {
        Ok(()) => Flash::Registered,
        Err(err) => {
            error!(?err, %username, "failed to send verification email");
            Flash::RegisteredMailFailed
        }
    };

    Ok(FlowRedirect::to("/login").with_flash(flash))
}

pub async fn confirm_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> FlowResult<FlowRedirect> {
    let email = match state.tokens().verify(&token, CONFIRMATION_MAX_AGE_SECS) {
        Ok(email) => email,
        Err(err) => {
            warn!(%err, "rejected confirmation token");
            return Err(FlowError::rejected("/login", Flash::InvalidLink));
        }
    };

    // The address may have been replaced since the link was mailed.
    if data::mark_email_verified(state.pool(), &email).await? == 0 {
        return Err(FlowError::rejected("/login", Flash::InvalidLink));
    }

    info!(%email, "email verified");
    Ok(FlowRedirect::to("/login").with_flash(Flash::Verified))
}

pub async fn login_page(
    jar: SignedCookieJar,
    Query(params): Query<FlashQuery>,
) -> Result<(SignedCookieJar, Html<String>), Redirect> {
    if let Some(redirect) = redirect_if_authenticated(&jar) {
        return Err(redirect);
    }

    let (jar, token) = csrf::ensure_token(jar);
    let page = render_login_page(&token, params.flash());
    Ok((jar, Html(page)))
}

pub async fn process_login(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(form): Form<LoginForm>,
) -> FlowResult<(SignedCookieJar, FlowRedirect)> {
    csrf::verify(&jar, form.csrf_token.as_deref(), "/login")?;

    let username = form.username.trim();
    let password = form.password.trim();

    let Some(user) = data::fetch_user_by_username(state.pool(), username).await? else {
        return Err(FlowError::rejected("/login", Flash::InvalidCredentials));
    };

    if !verify_password(password, &user.password) {
        return Err(FlowError::rejected("/login", Flash::InvalidCredentials));
    }

    if !user.is_verified {
        return Err(FlowError::rejected("/login", Flash::Unverified));
    }

    info!(user_id = user.id, "user logged in");
    let jar = session::start_session(jar, &user.username);
    Ok((jar, FlowRedirect::to("/").with_flash(Flash::LoggedIn)))
}

pub async fn logout(jar: SignedCookieJar) -> (SignedCookieJar, FlowRedirect) {
    let jar = session::end_session(jar);
    (jar, FlowRedirect::to("/").with_flash(Flash::LoggedOut))
}

/// Signs a fresh confirmation token for `email` and mails the link to it.
pub async fn send_verification(state: &AppState, username: &str, email: &str) -> Result<()> {
    let token = state.tokens().sign(email);
    let confirm_url = state.confirmation_url(&token);
    state
        .mailer()
        .send_verification_email(username, email, &confirm_url)
        .await
}

pub fn redirect_if_authenticated(jar: &SignedCookieJar) -> Option<Redirect> {
    session::current_username(jar).map(|_| Redirect::to("/"))
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed = PasswordHash::new(password_hash);
    match parsed {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_is_salted_and_verifies() {
        let first = hash_password("hunter2").expect("hash");
        let second = hash_password("hunter2").expect("hash");
        assert_ne!(first, second);
        assert!(!first.contains("hunter2"));
        assert!(verify_password("hunter2", &first));
        assert!(!verify_password("hunter3", &first));
        assert!(!verify_password("hunter2", "not-a-phc-string"));
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    fn register_form(email: &str) -> RegisterForm {
        RegisterForm {
            username: "alice".into(),
            email: email.into(),
            password: "hunter2".into(),
            csrf_token: None,
        }
    }

    #[test]
    fn register_form_validates_email_shape() {
        assert!(register_form("a@b.example").validate().is_ok());
        for bad in ["no-at-sign", "@example.com", "a@b@c", "a b@c.d", "a@-", "a@.b"] {
            assert!(register_form(bad).validate().is_err(), "{bad} should be rejected");
        }
    }
}
