use std::path::Path;

use anyhow::{Context, Result};
use axum::{
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use tracing::error;

use crate::web::templates::render_not_found_page;

/// Ensure the upload root exists before the server starts accepting files.
pub async fn ensure_storage_root(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .with_context(|| format!("failed to ensure storage root at {}", path.display()))
}

/// Content type guessed from the file extension; unknown types are served as octet streams.
pub fn content_type_for(path: &Path) -> mime::Mime {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => mime::IMAGE_PNG,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "gif" => mime::IMAGE_GIF,
        "bmp" => mime::IMAGE_BMP,
        "webp" => "image/webp".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

/// Stream a stored file inline, or a 404 page when it does not exist.
pub async fn serve_file(path: &Path) -> Response {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return not_found(),
        Err(err) => {
            error!(?err, file = %path.display(), "failed to read stored upload");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(content_type_for(path).as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );

    (headers, bytes).into_response()
}

pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Html(render_not_found_page())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for(Path::new("a.PNG")), mime::IMAGE_PNG);
        assert_eq!(content_type_for(Path::new("a.jpeg")), mime::IMAGE_JPEG);
        assert_eq!(content_type_for(Path::new("a.webp")).as_ref(), "image/webp");
        assert_eq!(
            content_type_for(Path::new("notes")),
            mime::APPLICATION_OCTET_STREAM
        );
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempdir().expect("temp dir");
        let response = serve_file(&dir.path().join("absent.png")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn existing_file_is_served_with_type() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("mole.jpg");
        tokio::fs::write(&path, b"jpeg-bytes").await.expect("write");

        let response = serve_file(&path).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("image/jpeg")
        );
    }
}
