use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use chrono::{Duration as ChronoDuration, Utc};
use cookie::time::Duration as CookieDuration;

use crate::web::{
    AppState,
    data::fetch_user_by_username,
    models::UserRow,
    responses::{Flash, FlowError, FlowResult},
};

pub const SESSION_COOKIE: &str = "session";
pub const SESSION_TTL_DAYS: i64 = 7;

/// Writes (or renews) the session cookie for `username`, valid for seven days from now.
///
/// The signed value is `<expires_at>|<username>`, so an old cookie replayed past its
/// lifetime is refused even if the browser kept it.
pub fn start_session(jar: SignedCookieJar, username: &str) -> SignedCookieJar {
    let expires_at = Utc::now() + ChronoDuration::days(SESSION_TTL_DAYS);

    let mut cookie = Cookie::new(
        SESSION_COOKIE,
        format!("{}|{}", expires_at.timestamp(), username),
    );
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(CookieDuration::days(SESSION_TTL_DAYS));

    jar.add(cookie)
}

pub fn end_session(jar: SignedCookieJar) -> SignedCookieJar {
    let mut removal = Cookie::new(SESSION_COOKIE, "");
    removal.set_path("/");
    removal.set_http_only(true);
    removal.set_same_site(SameSite::Lax);
    jar.remove(removal)
}

/// Username of the live session, if any.
pub fn current_username(jar: &SignedCookieJar) -> Option<String> {
    let cookie = jar.get(SESSION_COOKIE)?;
    let (expires_at, username) = cookie.value().split_once('|')?;
    let expires_at: i64 = expires_at.parse().ok()?;

    if expires_at <= Utc::now().timestamp() || username.is_empty() {
        return None;
    }
    Some(username.to_string())
}

/// Gate for protected pages: resolves the session to its account and slides the expiry.
pub async fn require_account(
    state: &AppState,
    jar: SignedCookieJar,
) -> FlowResult<(SignedCookieJar, UserRow)> {
    let Some(username) = current_username(&jar) else {
        return Err(FlowError::rejected("/login", Flash::LoginRequired));
    };

    match fetch_user_by_username(state.pool(), &username).await? {
        Some(user) => Ok((start_session(jar, &user.username), user)),
        None => Err(FlowError::rejected("/login", Flash::LoginRequired)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_extra::extract::cookie::Key;

    fn jar() -> SignedCookieJar {
        SignedCookieJar::new(Key::generate())
    }

    #[test]
    fn started_session_resolves_username() {
        let jar = start_session(jar(), "alice");
        assert_eq!(current_username(&jar).as_deref(), Some("alice"));

        let cookie = jar.get(SESSION_COOKIE).expect("session cookie");
        assert_eq!(cookie.max_age(), Some(CookieDuration::days(7)));
    }

    #[test]
    fn username_may_contain_separator() {
        let jar = start_session(jar(), "a|b");
        assert_eq!(current_username(&jar).as_deref(), Some("a|b"));
    }

    #[test]
    fn expired_session_is_ignored() {
        let past = Utc::now().timestamp() - 1;
        let jar = jar().add(Cookie::new(SESSION_COOKIE, format!("{past}|alice")));
        assert_eq!(current_username(&jar), None);
    }

    #[test]
    fn ended_session_is_gone() {
        let jar = end_session(start_session(jar(), "alice"));
        assert_eq!(current_username(&jar), None);
    }
}
