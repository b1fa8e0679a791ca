//! Source image validation.

use arlink_core::PipelineError;
use image::ImageFormat;
use std::io::Cursor;

/// Maximum side length accepted for a source photo.
pub const MAX_IMAGE_DIMENSION: u32 = 8192;

/// Validate format and dimensions of a source image; returns (width, height).
///
/// Only JPEG and PNG are accepted as marker sources. Anything else is a
/// caller error and never retried.
pub fn validate_source_image(data: &[u8]) -> Result<(u32, u32), PipelineError> {
    let format = image::guess_format(data)
        .map_err(|_| PipelineError::InvalidInput("Unrecognized image format".to_string()))?;

    if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
        return Err(PipelineError::InvalidInput(format!(
            "Unsupported image format {:?}: expected JPEG or PNG",
            format
        )));
    }

    let (width, height) = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| PipelineError::InvalidInput(format!("Unreadable image: {}", e)))?
        .into_dimensions()
        .map_err(|e| PipelineError::InvalidInput(format!("Undecodable image: {}", e)))?;

    if width == 0 || height == 0 || width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
        return Err(PipelineError::InvalidInput(format!(
            "Image dimensions {}x{} out of bounds (max {})",
            width, height, MAX_IMAGE_DIMENSION
        )));
    }

    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::new(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn accepts_png() {
        let (w, h) = validate_source_image(&png_bytes(4, 3)).unwrap();
        assert_eq!((w, h), (4, 3));
    }

    #[test]
    fn rejects_garbage() {
        let err = validate_source_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn rejects_unsupported_format() {
        let img = image::RgbImage::new(2, 2);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Bmp).unwrap();

        let err = validate_source_image(&out.into_inner()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }
}
