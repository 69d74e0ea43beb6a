use std::borrow::Cow;

use chrono::{Datelike, Utc};

use crate::web::{csrf, responses::Flash};

const SITE_TITLE: &str = "DermaScan";

const BASE_STYLES: &str = r#"
        :root { color-scheme: light; }
        body { font-family: "Helvetica Neue", Arial, sans-serif; margin: 0; background: #f8fafc; color: #0f172a; min-height: 100vh; display: flex; flex-direction: column; }
        header { background: #ffffff; padding: 1.25rem clamp(1.5rem, 6vw, 3rem); border-bottom: 1px solid #e2e8f0; }
        .header-bar { display: flex; justify-content: space-between; align-items: center; flex-wrap: wrap; gap: 1rem; }
        .brand { font-size: 1.5rem; font-weight: 700; color: #0f172a; text-decoration: none; }
        nav { display: flex; gap: 0.75rem; align-items: center; flex-wrap: wrap; }
        nav a { color: #1d4ed8; text-decoration: none; font-weight: 600; background: #e0f2fe; padding: 0.45rem 0.9rem; border-radius: 999px; border: 1px solid #bfdbfe; }
        nav a:hover { background: #bfdbfe; border-color: #93c5fd; }
        nav span { color: #475569; font-size: 0.95rem; }
        main { flex: 1; padding: 2rem 1.5rem; max-width: 720px; margin: 0 auto; width: 100%; box-sizing: border-box; }
        .panel { background: #ffffff; border-radius: 16px; border: 1px solid #e2e8f0; padding: 2rem; box-shadow: 0 18px 40px rgba(15, 23, 42, 0.08); }
        .panel h1 { margin-top: 0; }
        label { display: block; margin-top: 1.1rem; font-weight: 600; }
        input { width: 100%; padding: 0.8rem; margin-top: 0.5rem; border-radius: 10px; border: 1px solid #cbd5f5; background: #f8fafc; font-size: 1rem; box-sizing: border-box; }
        input:focus { outline: none; border-color: #2563eb; box-shadow: 0 0 0 3px rgba(37, 99, 235, 0.15); }
        button { margin-top: 1.5rem; padding: 0.85rem 1.4rem; border: none; border-radius: 10px; background: #2563eb; color: #ffffff; font-weight: 600; font-size: 1rem; cursor: pointer; }
        button:hover { background: #1d4ed8; }
        .flash { padding: 1rem 1.25rem; border-radius: 10px; margin-bottom: 1.5rem; font-weight: 600; border: 1px solid transparent; }
        .flash.success { background: #ecfdf3; border-color: #bbf7d0; color: #166534; }
        .flash.info { background: #eff6ff; border-color: #bfdbfe; color: #1d4ed8; }
        .flash.warning { background: #fffbeb; border-color: #fde68a; color: #92400e; }
        .flash.error { background: #fef2f2; border-color: #fecaca; color: #b91c1c; }
        .note { color: #475569; line-height: 1.6; }
        dl { display: grid; grid-template-columns: max-content 1fr; gap: 0.5rem 1.5rem; }
        dt { font-weight: 600; color: #475569; }
        dd { margin: 0; }
        .app-footer { margin: 3rem 0 1.5rem; text-align: center; font-size: 0.85rem; color: #94a3b8; }
"#;

pub struct PageLayout<'a> {
    pub title: &'a str,
    pub username: Option<&'a str>,
    pub flash: Option<Flash>,
    pub body_html: Cow<'a, str>,
}

pub fn render_page(layout: PageLayout<'_>) -> String {
    let PageLayout {
        title,
        username,
        flash,
        body_html,
    } = layout;

    let nav = match username {
        Some(username) => format!(
            r#"<span>Signed in as <strong>{username}</strong></span>
                <a href="/detect">Detect</a>
                <a href="/profile">Profile</a>
                <a href="/logout">Log out</a>"#,
            username = escape_html(username),
        ),
        None => r#"<a href="/login">Log in</a>
                <a href="/register">Register</a>"#
            .to_string(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{title} · {site}</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>
{styles}
    </style>
</head>
<body>
    <header>
        <div class="header-bar">
            <a class="brand" href="/">{site}</a>
            <nav>
                {nav}
            </nav>
        </div>
    </header>
    <main>
        {flash}
{body_html}
        {footer}
    </main>
</body>
</html>"#,
        title = escape_html(title),
        site = SITE_TITLE,
        styles = BASE_STYLES,
        nav = nav,
        flash = render_flash(flash),
        body_html = body_html,
        footer = render_footer(),
    )
}

pub fn render_flash(flash: Option<Flash>) -> String {
    flash
        .map(|flash| {
            format!(
                r#"<div class="flash {level}">{message}</div>"#,
                level = flash.level().css_class(),
                message = escape_html(flash.message()),
            )
        })
        .unwrap_or_default()
}

pub fn render_login_page(csrf_token: &str, flash: Option<Flash>) -> String {
    let body = format!(
        r#"<section class="panel">
            <h1>Log in</h1>
            <form method="post" action="/login">
                {csrf}
                <label for="username">Username</label>
                <input id="username" name="username" autocomplete="username" required>
                <label for="password">Password</label>
                <input id="password" type="password" name="password" autocomplete="current-password" required>
                <button type="submit">Log in</button>
            </form>
            <p class="note">No account yet? <a href="/register">Register here</a>.</p>
        </section>"#,
        csrf = csrf::hidden_field(csrf_token),
    );

    render_page(PageLayout {
        title: "Log in",
        username: None,
        flash,
        body_html: Cow::Owned(body),
    })
}

pub fn render_register_page(csrf_token: &str, flash: Option<Flash>) -> String {
    let body = format!(
        r#"<section class="panel">
            <h1>Create an account</h1>
            <form method="post" action="/register">
                {csrf}
                <label for="username">Username</label>
                <input id="username" name="username" autocomplete="username" required>
                <label for="email">Email</label>
                <input id="email" type="email" name="email" autocomplete="email" required>
                <label for="password">Password</label>
                <input id="password" type="password" name="password" autocomplete="new-password" required>
                <button type="submit">Register</button>
            </form>
            <p class="note">We will email you a verification link that stays valid for one hour.</p>
        </section>"#,
        csrf = csrf::hidden_field(csrf_token),
    );

    render_page(PageLayout {
        title: "Register",
        username: None,
        flash,
        body_html: Cow::Owned(body),
    })
}

pub fn render_error_page() -> String {
    render_page(PageLayout {
        title: "Server error",
        username: None,
        flash: None,
        body_html: Cow::Borrowed(
            r#"<section class="panel"><h1>Something went wrong</h1><p class="note">Please try again later.</p></section>"#,
        ),
    })
}

pub fn render_not_found_page() -> String {
    render_page(PageLayout {
        title: "Not found",
        username: None,
        flash: None,
        body_html: Cow::Borrowed(
            r#"<section class="panel"><h1>Not found</h1><p class="note">The requested file does not exist.</p></section>"#,
        ),
    })
}

pub fn render_footer() -> String {
    let current_year = Utc::now().year();
    format!(
        r#"<footer class="app-footer">© {year} {site}. Results are not a medical diagnosis.</footer>"#,
        year = current_year,
        site = SITE_TITLE,
    )
}

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn layout_shows_flash_and_user() {
        let html = render_page(PageLayout {
            title: "Profile",
            username: Some("<bob>"),
            flash: Some(Flash::EmailUpdated),
            body_html: Cow::Borrowed("<p>body</p>"),
        });
        assert!(html.contains(r#"<div class="flash info">Email updated. Verification sent.</div>"#));
        assert!(html.contains("&lt;bob&gt;"));
        assert!(html.contains(r#"href="/logout""#));
    }

    #[test]
    fn login_form_embeds_csrf_field() {
        let html = render_login_page("tok123", None);
        assert!(html.contains(r#"name="csrf_token" value="tok123""#));
    }
}
