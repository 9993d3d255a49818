//! Image intake: browser data URLs, RGB decoding, dark-capture detection.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ImageError, ImageReader, Limits, RgbImage};
use std::io::Cursor;
use thiserror::Error;

/// Fraction of near-black pixels above which a capture counts as dark.
pub const DARK_THRESHOLD_PCT: f32 = 0.95;

/// Luma below this value counts as near-black.
const DARK_LUMA: u8 = 32;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("empty image payload")]
    Empty,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unreadable image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image is too dark to contain a face")]
    TooDark,
    #[error("decoded image would exceed {0} bytes")]
    TooLarge(u64),
}

/// Decode a `data:image/...;base64,<payload>` URL (or bare base64) into RGB.
///
/// `max_decoded_bytes` bounds the pixel buffer the decoder may allocate.
pub fn decode_data_url(data_url: &str, max_decoded_bytes: u64) -> Result<RgbImage, CaptureError> {
    let payload = match data_url.split_once(',') {
        Some((_, rest)) => rest,
        None => data_url,
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(CaptureError::Empty);
    }

    let bytes = STANDARD.decode(payload)?;
    decode_bytes(&bytes, max_decoded_bytes)
}

/// Decode encoded image bytes (PNG, JPEG, ...) into RGB.
pub fn decode_bytes(bytes: &[u8], max_decoded_bytes: u64) -> Result<RgbImage, CaptureError> {
    if bytes.is_empty() {
        return Err(CaptureError::Empty);
    }

    let mut limits = Limits::default();
    limits.max_alloc = Some(max_decoded_bytes);
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(ImageError::IoError)?;
    reader.limits(limits);

    match reader.decode() {
        Ok(image) => Ok(image.to_rgb8()),
        Err(ImageError::Limits(_)) => Err(CaptureError::TooLarge(max_decoded_bytes)),
        Err(e) => Err(e.into()),
    }
}

/// Decode a data URL and reject captures where the camera saw nothing.
pub fn decode_capture(data_url: &str, max_decoded_bytes: u64) -> Result<RgbImage, CaptureError> {
    let image = decode_data_url(data_url, max_decoded_bytes)?;
    if is_dark(&image, DARK_THRESHOLD_PCT) {
        return Err(CaptureError::TooDark);
    }
    Ok(image)
}

/// BT.601 luma for each pixel, row-major.
pub fn luma(image: &RgbImage) -> Vec<u8> {
    image
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
            y.round().clamp(0.0, 255.0) as u8
        })
        .collect()
}

/// True if more than `threshold_pct` of pixels are near-black.
pub fn is_dark(image: &RgbImage, threshold_pct: f32) -> bool {
    let gray = luma(image);
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < DARK_LUMA).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};

    const LIMIT: u64 = 1 << 20;

    fn png_data_url(image: &RgbImage) -> String {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(bytes))
    }

    #[test]
    fn test_decode_data_url_png() {
        let src = RgbImage::from_pixel(4, 3, Rgb([10, 200, 30]));
        let decoded = decode_data_url(&png_data_url(&src), LIMIT).unwrap();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(2, 1), &Rgb([10, 200, 30]));
    }

    #[test]
    fn test_decode_bare_base64() {
        let src = RgbImage::from_pixel(2, 2, Rgb([1, 2, 3]));
        let url = png_data_url(&src);
        let bare = url.split_once(',').unwrap().1;
        assert_eq!(decode_data_url(bare, LIMIT).unwrap().dimensions(), (2, 2));
    }

    #[test]
    fn test_decode_empty_payload() {
        assert!(matches!(decode_data_url("data:image/png;base64,", LIMIT), Err(CaptureError::Empty)));
        assert!(matches!(decode_data_url("", LIMIT), Err(CaptureError::Empty)));
    }

    #[test]
    fn test_decode_bad_base64() {
        assert!(matches!(
            decode_data_url("data:image/png;base64,***", LIMIT),
            Err(CaptureError::Base64(_))
        ));
    }

    #[test]
    fn test_decode_not_an_image() {
        let url = format!("data:image/png;base64,{}", STANDARD.encode(b"hello world"));
        assert!(matches!(decode_data_url(&url, LIMIT), Err(CaptureError::Decode(_))));
    }

    #[test]
    fn test_decoded_size_is_capped() {
        let src = RgbImage::from_pixel(64, 64, Rgb([200, 10, 10]));
        let url = png_data_url(&src);
        assert!(matches!(decode_data_url(&url, 1024), Err(CaptureError::TooLarge(1024))));
        assert!(decode_data_url(&url, 1 << 16).is_ok());
    }

    #[test]
    fn test_luma_weights() {
        let img = RgbImage::from_pixel(1, 1, Rgb([255, 255, 255]));
        assert_eq!(luma(&img), vec![255]);
        let img = RgbImage::from_pixel(1, 1, Rgb([0, 255, 0]));
        assert_eq!(luma(&img), vec![150]);
    }

    #[test]
    fn test_dark_capture_rejected() {
        let black = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
        assert!(matches!(decode_capture(&png_data_url(&black), LIMIT), Err(CaptureError::TooDark)));
    }

    #[test]
    fn test_dark_borderline() {
        // 60 of 1000 pixels bright → 94% dark, not over the threshold.
        let mut img = RgbImage::from_pixel(100, 10, Rgb([5, 5, 5]));
        for x in 0..60 {
            img.put_pixel(x % 100, x / 100, Rgb([200, 200, 200]));
        }
        assert!(!is_dark(&img, DARK_THRESHOLD_PCT));
    }

    #[test]
    fn test_empty_image_is_dark() {
        assert!(is_dark(&RgbImage::new(0, 0), DARK_THRESHOLD_PCT));
    }
}
