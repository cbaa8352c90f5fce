//! Store photo pipeline: type check, resize and write to the uploads directory.

use std::path::{Path, PathBuf};

use photon_rs::native::{open_image_from_bytes, save_image};
use photon_rs::transform::{resize, SamplingFilter};

use crate::errors::AppError;

/// Width every stored photo is resized to.
pub const PHOTO_WIDTH: u32 = 800;

/// Tallest photo kept after resizing to [`PHOTO_WIDTH`].
pub const MAX_PHOTO_HEIGHT: u32 = 4_000;

pub const FILETYPE_NOT_ALLOWED: &str = "That filetype isn't allowed!";
pub const PHOTO_TOO_LARGE: &str = "That photo is too large";

/// A photo part taken from a multipart form.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl PhotoUpload {
    /// Accept the upload if its content type is an image.
    ///
    /// Empty parts are what browsers send when no file was picked; they yield
    /// `Ok(None)`.
    pub fn new(content_type: Option<&str>, bytes: Vec<u8>) -> Result<Option<Self>, AppError> {
        if bytes.is_empty() {
            return Ok(None);
        }

        let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
        if !content_type.starts_with("image/") {
            return Err(AppError::validation(FILETYPE_NOT_ALLOWED));
        }

        Ok(Some(Self {
            content_type,
            bytes,
        }))
    }

    /// File extension derived from the MIME subtype (`image/png` → `png`).
    pub fn extension(&self) -> Result<&str, AppError> {
        let subtype = self
            .content_type
            .strip_prefix("image/")
            .unwrap_or_default()
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();

        if subtype.is_empty() || !subtype.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AppError::validation(FILETYPE_NOT_ALLOWED));
        }
        Ok(subtype)
    }
}

/// Height that keeps the aspect ratio at [`PHOTO_WIDTH`].
pub fn scaled_height(width: u32, height: u32) -> u32 {
    if width == 0 {
        return height.max(1);
    }
    let scaled = (height as f64 * PHOTO_WIDTH as f64 / width as f64).round() as u32;
    scaled.max(1)
}

/// Target size of a resized photo. Photos that would end up taller than
/// [`MAX_PHOTO_HEIGHT`] are rejected before the resize buffer is allocated.
pub fn resized_dimensions(width: u32, height: u32) -> Result<(u32, u32), AppError> {
    let height = scaled_height(width, height);
    if height > MAX_PHOTO_HEIGHT {
        return Err(AppError::Image(PHOTO_TOO_LARGE.to_string()));
    }
    Ok((PHOTO_WIDTH, height))
}

/// Resize and write the photo, returning its new file name.
///
/// Decoding and encoding run on the blocking pool.
pub async fn save_photo(upload: PhotoUpload, uploads_dir: &Path) -> Result<String, AppError> {
    let filename = format!("{}.{}", uuid::Uuid::new_v4(), upload.extension()?);
    let path: PathBuf = uploads_dir.join(&filename);

    tokio::fs::create_dir_all(uploads_dir)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create uploads directory: {}", e)))?;

    let target = path.clone();
    tokio::task::spawn_blocking(move || resize_and_write(&upload.bytes, &target))
        .await
        .map_err(|e| AppError::Internal(format!("Photo task failed: {}", e)))??;

    tracing::debug!("Saved photo {}", path.display());
    Ok(filename)
}

fn resize_and_write(bytes: &[u8], path: &Path) -> Result<(), AppError> {
    let img = open_image_from_bytes(bytes)
        .map_err(|e| AppError::Image(format!("Could not read the photo: {}", e)))?;

    let (width, height) = resized_dimensions(img.get_width(), img.get_height())?;
    let resized = resize(&img, width, height, SamplingFilter::Lanczos3);

    let path = path
        .to_str()
        .ok_or_else(|| AppError::Internal("Uploads path is not valid UTF-8".to_string()))?;
    save_image(resized, path).map_err(|e| AppError::Image(format!("Could not save the photo: {}", e)))
}
