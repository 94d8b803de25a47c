//! Image preparation before upload.
//!
//! Vision models work on small inputs, so every image is decoded, scaled
//! down so its longest edge fits the resolution limit, and re-encoded as
//! JPEG. The base64 encoding happens in the transport layer.

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, GenericImageView, ImageFormat, imageops::FilterType};
use thiserror::Error;

/// Default longest edge, in pixels, of the image sent to the model.
pub const DEFAULT_RESOLUTION_LIMIT: u32 = 448;

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("Failed to decode image {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
}

/// A downscaled JPEG ready to send to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Loads `path`, scales it to fit `max_edge`, and encodes it as JPEG.
///
/// # Errors
///
/// Returns `ImagingError::Decode` for formats the decoder does not support
/// (camera RAW, HEIF) or corrupt files.
pub fn prepare_image(path: &Path, max_edge: u32) -> Result<PreparedImage, ImagingError> {
    let decoded = image::open(path).map_err(|source| ImagingError::Decode {
        path: path.display().to_string(),
        source,
    })?;
    encode_scaled(decoded, max_edge)
}

fn encode_scaled(decoded: DynamicImage, max_edge: u32) -> Result<PreparedImage, ImagingError> {
    let (width, height) = decoded.dimensions();
    let (target_w, target_h) = fit_to_max_edge(width, height, max_edge);

    let scaled = if (target_w, target_h) == (width, height) {
        decoded
    } else {
        decoded.resize_exact(target_w, target_h, FilterType::CatmullRom)
    };

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(scaled.to_rgb8());
    let mut jpeg = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
        .map_err(ImagingError::Encode)?;

    Ok(PreparedImage {
        jpeg,
        width: target_w,
        height: target_h,
    })
}

/// Scales `(width, height)` so the longest edge is at most `max_edge`,
/// preserving aspect ratio. Images already small enough are unchanged.
fn fit_to_max_edge(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }
    let clamped = max_edge.max(1);
    if width.max(height) <= clamped {
        return (width, height);
    }
    if width >= height {
        let scaled =
            ((u64::from(height) * u64::from(clamped)) + (u64::from(width) / 2)) / u64::from(width);
        (clamped, scaled.max(1) as u32)
    } else {
        let scaled =
            ((u64::from(width) * u64::from(clamped)) + (u64::from(height) / 2)) / u64::from(height);
        (scaled.max(1) as u32, clamped)
    }
}
