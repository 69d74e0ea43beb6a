use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::error;

use crate::web::templates::render_error_page;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Error,
}

impl FlashLevel {
    pub fn css_class(&self) -> &'static str {
        match self {
            FlashLevel::Success => "success",
            FlashLevel::Info => "info",
            FlashLevel::Warning => "warning",
            FlashLevel::Error => "error",
        }
    }
}

/// One-shot user-facing notice carried across a redirect as `?flash=<code>`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flash {
    Registered,
    RegisteredMailFailed,
    AlreadyExists,
    MissingFields,
    InvalidCredentials,
    Unverified,
    LoggedIn,
    LoggedOut,
    LoginRequired,
    Verified,
    InvalidLink,
    EmailUpdated,
    EmailUpdatedMailFailed,
    EmailTaken,
    InvalidEmail,
    NoImage,
    UploadFailed,
    FormExpired,
}

impl Flash {
    const ALL: [Flash; 18] = [
        Flash::Registered,
        Flash::RegisteredMailFailed,
        Flash::AlreadyExists,
        Flash::MissingFields,
        Flash::InvalidCredentials,
        Flash::Unverified,
        Flash::LoggedIn,
        Flash::LoggedOut,
        Flash::LoginRequired,
        Flash::Verified,
        Flash::InvalidLink,
        Flash::EmailUpdated,
        Flash::EmailUpdatedMailFailed,
        Flash::EmailTaken,
        Flash::InvalidEmail,
        Flash::NoImage,
        Flash::UploadFailed,
        Flash::FormExpired,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Flash::Registered => "registered",
            Flash::RegisteredMailFailed => "registered_mail_failed",
            Flash::AlreadyExists => "already_exists",
            Flash::MissingFields => "missing_fields",
            Flash::InvalidCredentials => "invalid_credentials",
            Flash::Unverified => "unverified",
            Flash::LoggedIn => "logged_in",
            Flash::LoggedOut => "logged_out",
            Flash::LoginRequired => "login_required",
            Flash::Verified => "verified",
            Flash::InvalidLink => "invalid_link",
            Flash::EmailUpdated => "email_updated",
            Flash::EmailUpdatedMailFailed => "email_updated_mail_failed",
            Flash::EmailTaken => "email_taken",
            Flash::InvalidEmail => "invalid_email",
            Flash::NoImage => "no_image",
            Flash::UploadFailed => "upload_failed",
            Flash::FormExpired => "form_expired",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|flash| flash.code() == code)
    }

    pub fn level(&self) -> FlashLevel {
        match self {
            Flash::Registered | Flash::LoggedIn | Flash::Verified => FlashLevel::Success,
            Flash::LoggedOut | Flash::EmailUpdated => FlashLevel::Info,
            Flash::Unverified | Flash::RegisteredMailFailed | Flash::EmailUpdatedMailFailed => {
                FlashLevel::Warning
            }
            _ => FlashLevel::Error,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Flash::Registered => "Registration successful! Check your email to verify.",
            Flash::RegisteredMailFailed => {
                "Registration successful, but the verification email could not be sent."
            }
            Flash::AlreadyExists => "Username or email already exists.",
            Flash::MissingFields => "Please fill in every field.",
            Flash::InvalidCredentials => "Invalid credentials.",
            Flash::Unverified => "Please verify your email before logging in.",
            Flash::LoggedIn => "Logged in successfully!",
            Flash::LoggedOut => "Logged out.",
            Flash::LoginRequired => "Login required.",
            Flash::Verified => "Email verified! You can now login.",
            Flash::InvalidLink => "Invalid or expired link.",
            Flash::EmailUpdated => "Email updated. Verification sent.",
            Flash::EmailUpdatedMailFailed => {
                "Email updated, but the verification email could not be sent."
            }
            Flash::EmailTaken => "That email is already in use.",
            Flash::InvalidEmail => "Please enter a valid email address.",
            Flash::NoImage => "Please choose an image to upload.",
            Flash::UploadFailed => "Upload failed, please try again.",
            Flash::FormExpired => "Your form expired, please try again.",
        }
    }
}

#[derive(Default, Deserialize)]
pub struct FlashQuery {
    pub flash: Option<String>,
}

impl FlashQuery {
    pub fn flash(&self) -> Option<Flash> {
        self.flash.as_deref().and_then(Flash::from_code)
    }
}

/// Successful end of a form flow: redirect somewhere, optionally with a notice.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FlowRedirect {
    target: &'static str,
    flash: Option<Flash>,
}

impl FlowRedirect {
    pub fn to(target: &'static str) -> Self {
        Self {
            target,
            flash: None,
        }
    }

    pub fn with_flash(mut self, flash: Flash) -> Self {
        self.flash = Some(flash);
        self
    }

    pub fn location(&self) -> String {
        match self.flash {
            Some(flash) => format!("{}?flash={}", self.target, flash.code()),
            None => self.target.to_string(),
        }
    }
}

impl IntoResponse for FlowRedirect {
    fn into_response(self) -> Response {
        Redirect::to(&self.location()).into_response()
    }
}

/// Failure of a form flow. `Rejected` bounces the browser back with a notice; `Internal`
/// is logged and rendered as a 500 page.
#[derive(Debug)]
pub enum FlowError {
    Rejected(FlowRedirect),
    Internal(anyhow::Error),
}

impl FlowError {
    pub fn rejected(target: &'static str, flash: Flash) -> Self {
        FlowError::Rejected(FlowRedirect::to(target).with_flash(flash))
    }
}

impl From<anyhow::Error> for FlowError {
    fn from(err: anyhow::Error) -> Self {
        FlowError::Internal(err)
    }
}

impl From<sqlx::Error> for FlowError {
    fn from(err: sqlx::Error) -> Self {
        FlowError::Internal(err.into())
    }
}

impl IntoResponse for FlowError {
    fn into_response(self) -> Response {
        match self {
            FlowError::Rejected(redirect) => redirect.into_response(),
            FlowError::Internal(err) => {
                error!(?err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html(render_error_page()),
                )
                    .into_response()
            }
        }
    }
}

pub type FlowResult<T> = Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_flash_code_round_trips() {
        for flash in Flash::ALL {
            assert_eq!(Flash::from_code(flash.code()), Some(flash));
        }
        assert_eq!(Flash::from_code("bogus"), None);
    }

    #[test]
    fn redirect_location_carries_flash_code() {
        let redirect = FlowRedirect::to("/login").with_flash(Flash::Unverified);
        assert_eq!(redirect.location(), "/login?flash=unverified");
        assert_eq!(FlowRedirect::to("/").location(), "/");
    }

    #[test]
    fn rejected_error_becomes_see_other() {
        let response = FlowError::rejected("/register", Flash::AlreadyExists).into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get("location").and_then(|v| v.to_str().ok()),
            Some("/register?flash=already_exists")
        );
    }

    #[test]
    fn internal_error_is_a_server_error() {
        let response = FlowError::from(anyhow::anyhow!("boom")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
