use std::io::Cursor;

use image::{DynamicImage, ImageFormat};

/// Derive a JPEG thumbnail from an uploaded image, preserving aspect ratio
/// within a `max_px` bounding box.
///
/// Decoding and re-encoding are CPU-bound, so the work runs on the blocking
/// pool.
pub async fn derive(bytes: Vec<u8>, max_px: u32) -> Result<Vec<u8>, ThumbnailError> {
    tokio::task::spawn_blocking(move || {
        let img = image::load_from_memory(&bytes)?;
        let thumb = img.thumbnail(max_px, max_px);

        // JPEG has no alpha channel; flatten before encoding.
        let rgb = DynamicImage::ImageRgb8(thumb.to_rgb8());

        let mut out = Cursor::new(Vec::new());
        rgb.write_to(&mut out, ImageFormat::Jpeg)?;
        Ok(out.into_inner())
    })
    .await
    .map_err(|_| ThumbnailError::Cancelled)?
}

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("Image decode/encode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Thumbnail task was cancelled")]
    Cancelled,
}
