//! Image normalization: decode anything, cap the width, emit JPEG.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::Path;

use crate::error::{ProductError, ProductResult};

/// Widest image the catalog stores; wider uploads are scaled down to it.
pub const MAX_WIDTH: u32 = 1200;

/// Extension of the canonical encoding.
pub const CANONICAL_EXTENSION: &str = "jpg";

const JPEG_QUALITY: u8 = 75;

/// Output of [`normalize`], ready for upload.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub width: u32,
    pub height: u32,
}

/// Decode `raw`, downsize it to [`MAX_WIDTH`] if wider, and re-encode it as JPEG.
///
/// The returned filename is `declared_filename` stripped of directories with its
/// extension replaced by [`CANONICAL_EXTENSION`]. Alpha is discarded.
pub fn normalize(raw: &[u8], declared_filename: &str) -> ProductResult<NormalizedImage> {
    let decoded = image::load_from_memory(raw).map_err(|e| ProductError::Decode(e.to_string()))?;
    let (source_width, source_height) = (decoded.width(), decoded.height());

    let rgb = downsize(decoded).to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| ProductError::Encode(e.to_string()))?;

    let filename = canonical_filename(declared_filename);
    tracing::debug!(
        %filename,
        source_width,
        source_height,
        width,
        height,
        size = bytes.len(),
        "image normalized"
    );

    Ok(NormalizedImage {
        bytes,
        filename,
        width,
        height,
    })
}

fn downsize(image: DynamicImage) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    if width <= MAX_WIDTH {
        return image;
    }
    let scaled_height = scaled_height(width, height);
    image.resize_exact(MAX_WIDTH, scaled_height, FilterType::Lanczos3)
}

/// Height that keeps the aspect ratio once `width` becomes [`MAX_WIDTH`].
fn scaled_height(width: u32, height: u32) -> u32 {
    let scaled = (height as f64 * MAX_WIDTH as f64 / width as f64).round();
    (scaled as u32).max(1)
}

fn canonical_filename(declared: &str) -> String {
    let stem = Path::new(declared)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("image");
    format!("{stem}.{CANONICAL_EXTENSION}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        image.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
        encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
    }

    #[test]
    fn test_wide_image_is_capped_at_max_width() {
        let out = normalize(&png(2400, 1200), "banner.png").unwrap();
        assert_eq!((out.width, out.height), (1200, 600));

        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (1200, 600));
    }

    #[test]
    fn test_aspect_ratio_rounds_to_nearest_pixel() {
        let out = normalize(&png(3000, 1001), "tall.png").unwrap();
        assert_eq!(out.width, 1200);
        assert_eq!(out.height, 400);
    }

    #[test]
    fn test_narrow_image_keeps_native_resolution() {
        let out = normalize(&png(800, 533), "mug.png").unwrap();
        assert_eq!((out.width, out.height), (800, 533));
    }

    #[test]
    fn test_exactly_max_width_is_untouched() {
        let out = normalize(&png(1200, 90), "strip.png").unwrap();
        assert_eq!((out.width, out.height), (1200, 90));
    }

    #[test]
    fn test_output_is_always_jpeg() {
        let rgba = RgbaImage::from_pixel(40, 30, Rgba([10, 200, 30, 128]));
        let gif = encode(DynamicImage::ImageRgba8(rgba), ImageFormat::Gif);

        let out = normalize(&gif, "anim.gif").unwrap();
        assert_eq!(image::guess_format(&out.bytes).unwrap(), ImageFormat::Jpeg);
        assert_eq!(out.filename, "anim.jpg");
    }

    #[test]
    fn test_every_enabled_codec_decodes() {
        let source = RgbImage::from_pixel(16, 8, Rgb([200, 40, 40]));
        for (format, name) in [
            (ImageFormat::Png, "a.png"),
            (ImageFormat::Jpeg, "a.jpeg"),
            (ImageFormat::Bmp, "a.bmp"),
            (ImageFormat::Tiff, "a.tiff"),
            (ImageFormat::WebP, "a.webp"),
        ] {
            let raw = encode(DynamicImage::ImageRgb8(source.clone()), format);
            let out = normalize(&raw, name).unwrap();
            assert_eq!((out.width, out.height), (16, 8), "{format:?}");
            assert_eq!(out.filename, "a.jpg");
        }
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        let err = normalize(b"definitely not an image", "notes.txt").unwrap_err();
        assert!(matches!(err, ProductError::Decode(_)));

        let err = normalize(&[], "empty.png").unwrap_err();
        assert!(matches!(err, ProductError::Decode(_)));
    }

    #[test]
    fn test_canonical_filename() {
        assert_eq!(canonical_filename("photo.PNG"), "photo.jpg");
        assert_eq!(canonical_filename("uploads/2024/cat.webp"), "cat.jpg");
        assert_eq!(canonical_filename("archive.tar.gz"), "archive.tar.jpg");
        assert_eq!(canonical_filename("noext"), "noext.jpg");
        assert_eq!(canonical_filename(""), "image.jpg");
    }

    #[test]
    fn test_scaled_height_never_collapses_to_zero() {
        assert_eq!(scaled_height(100_000, 10), 1);
    }
}
