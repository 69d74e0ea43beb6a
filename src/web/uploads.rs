use std::path::{Path, PathBuf};

use axum::{
    body::Bytes,
    extract::{Multipart, multipart::MultipartError},
};
use thiserror::Error;
use tokio::{fs::File, io::AsyncWriteExt};

use crate::web::csrf::CSRF_FIELD;

pub const IMAGE_FIELD: &str = "image";

const FALLBACK_STEM: &str = "upload";

pub type UploadResult<T> = Result<T, UploadError>;

/// Error returned when reading or persisting an uploaded image.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to read upload form: {0}")]
    Form(#[from] MultipartError),
    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Image part received from the detection form, still in memory.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub original_name: String,
    pub bytes: Bytes,
}

/// Parsed detection form: the CSRF field and the optional image part.
#[derive(Debug, Default)]
pub struct ImageForm {
    pub csrf_token: Option<String>,
    pub image: Option<UploadedImage>,
}

/// Metadata describing a stored upload on disk.
#[derive(Debug, Clone)]
pub struct SavedFile {
    pub stored_name: String,
    pub stored_path: PathBuf,
    pub file_size: u64,
}

/// Reads the multipart body without touching disk, so the form token can be checked first.
///
/// A file input left empty by the browser (no name, no bytes) counts as no image.
pub async fn read_image_form(mut multipart: Multipart) -> UploadResult<ImageForm> {
    let mut form = ImageForm::default();

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or("").to_string();

        if field_name == IMAGE_FIELD && field.file_name().is_some() {
            let original_name = field.file_name().unwrap_or("").to_string();
            let bytes = field.bytes().await?;
            if original_name.is_empty() && bytes.is_empty() {
                continue;
            }
            form.image = Some(UploadedImage {
                original_name,
                bytes,
            });
        } else if field_name == CSRF_FIELD {
            form.csrf_token = Some(field.text().await?);
        }
    }

    Ok(form)
}

/// Strips path components and reserved characters from a client-supplied name.
pub fn sanitized_name(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original);
    let sanitized = sanitize_filename::sanitize(base)
        .trim_start_matches('.')
        .to_string();

    if !sanitized.is_empty() {
        return sanitized;
    }

    let extension = Path::new(base)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| sanitize_filename::sanitize(ext).to_ascii_lowercase())
        .unwrap_or_default();
    if extension.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        format!("{FALLBACK_STEM}.{extension}")
    }
}

/// Writes the image under `dest_dir` using its sanitized name. A same-named file is replaced.
pub async fn store_image(dest_dir: &Path, image: &UploadedImage) -> UploadResult<SavedFile> {
    tokio::fs::create_dir_all(dest_dir).await?;

    let stored_name = sanitized_name(&image.original_name);
    let stored_path = dest_dir.join(&stored_name);

    let mut file = File::create(&stored_path).await?;
    file.write_all(&image.bytes).await?;
    file.flush().await?;

    Ok(SavedFile {
        stored_name,
        stored_path,
        file_size: image.bytes.len() as u64,
    })
}
