use std::borrow::Cow;

use axum::{extract::Query, response::Html};
use axum_extra::extract::cookie::SignedCookieJar;

use crate::{
    classifier::LesionClass,
    web::{
        escape_html,
        responses::FlashQuery,
        session,
        templates::{PageLayout, render_page},
    },
};

pub async fn landing_page(
    jar: SignedCookieJar,
    Query(params): Query<FlashQuery>,
) -> (SignedCookieJar, Html<String>) {
    let username = session::current_username(&jar);
    let jar = match username.as_deref() {
        Some(username) => session::start_session(jar, username),
        None => jar,
    };
    let page = render_landing_page(username.as_deref(), &params);
    (jar, Html(page))
}

fn render_landing_page(username: Option<&str>, params: &FlashQuery) -> String {
    let categories = LesionClass::ALL
        .iter()
        .map(|class| format!("<li>{}</li>", escape_html(&class.label().replace('_', " "))))
        .collect::<String>();

    let call_to_action = if username.is_some() {
        r#"<a href="/detect"><button type="button">Analyse an image</button></a>"#
    } else {
        r#"<a href="/register"><button type="button">Create an account</button></a>"#
    };

    let body = format!(
        r#"<section class="panel">
            <h1>Skin lesion screening</h1>
            <p class="note">Upload a photo of a skin lesion and a pretrained EfficientNet-B0 classifier
            will estimate which of seven categories it most resembles, along with a confidence score.</p>
            <ul>{categories}</ul>
            {call_to_action}
        </section>"#,
    );

    render_page(PageLayout {
        title: "Home",
        username,
        flash: params.flash(),
        body_html: Cow::Owned(body),
    })
}
