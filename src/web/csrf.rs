use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use uuid::Uuid;

use crate::web::{
    escape_html,
    responses::{Flash, FlowError, FlowResult},
};

pub const CSRF_COOKIE: &str = "csrf";
pub const CSRF_FIELD: &str = "csrf_token";

/// Returns the browser's form token, minting one into a signed cookie when absent.
pub fn ensure_token(jar: SignedCookieJar) -> (SignedCookieJar, String) {
    if let Some(existing) = jar.get(CSRF_COOKIE) {
        let token = existing.value().to_string();
        return (jar, token);
    }

    let token = Uuid::new_v4().simple().to_string();
    let mut cookie = Cookie::new(CSRF_COOKIE, token.clone());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);

    (jar.add(cookie), token)
}

/// Double-submit check: the posted field must equal the signed cookie value.
pub fn verify(
    jar: &SignedCookieJar,
    submitted: Option<&str>,
    back_to: &'static str,
) -> FlowResult<()> {
    match (jar.get(CSRF_COOKIE), submitted) {
        (Some(cookie), Some(submitted)) if !submitted.is_empty() && cookie.value() == submitted => {
            Ok(())
        }
        _ => Err(FlowError::rejected(back_to, Flash::FormExpired)),
    }
}

pub fn hidden_field(token: &str) -> String {
    format!(
        r#"<input type="hidden" name="{CSRF_FIELD}" value="{}">"#,
        escape_html(token)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_extra::extract::cookie::Key;

    #[test]
    fn token_is_stable_once_issued() {
        let (jar, first) = ensure_token(SignedCookieJar::new(Key::generate()));
        let (jar, second) = ensure_token(jar);
        assert_eq!(first, second);
        assert!(verify(&jar, Some(&first), "/register").is_ok());
    }

    #[test]
    fn mismatched_or_missing_token_is_rejected() {
        let (jar, _) = ensure_token(SignedCookieJar::new(Key::generate()));
        assert!(verify(&jar, Some("forged"), "/register").is_err());
        assert!(verify(&jar, None, "/register").is_err());

        let empty = SignedCookieJar::new(Key::generate());
        assert!(verify(&empty, Some(""), "/register").is_err());
    }
}
