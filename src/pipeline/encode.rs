//! Image encoding: page image bytes → cleaned base64 for the request body.
//!
//! Ollama takes images as bare base64 strings, without a `data:` prefix.
//! Anything that arrives as a data URL is cut down to the payload, and
//! unpadded payloads are padded so the server's decoder accepts them.
//!
//! Very large scans are downscaled before upload: a 40 MB photo of an
//! invoice gains the model nothing over a 2048 px rendition and can exceed
//! request-size limits.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// Images larger than this are downscaled before upload.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Longest side after downscaling, in pixels.
pub const MAX_IMAGE_DIMENSION: u32 = 2048;

/// JPEG quality used when re-encoding a downscaled JPEG.
const JPEG_QUALITY: u8 = 80;

/// Trim whitespace, drop a data-URL prefix (everything up to the first
/// comma) and pad with `=` to a multiple of four.
pub fn clean_base64(input: &str) -> String {
    let trimmed = input.trim();
    let payload = match trimmed.split_once(',') {
        Some((_, rest)) => rest,
        None => trimmed,
    };
    let mut out = payload.to_string();
    while out.len() % 4 != 0 {
        out.push('=');
    }
    out
}

/// Encode raw image file bytes as base64, downscaling first when
/// `optimise` is set and the file exceeds [`MAX_IMAGE_BYTES`].
pub fn encode_image_bytes(bytes: &[u8], optimise: bool) -> Result<String, image::ImageError> {
    if !optimise || bytes.len() <= MAX_IMAGE_BYTES {
        return Ok(STANDARD.encode(bytes));
    }

    let format = image::guess_format(bytes)?;
    let img = image::load_from_memory_with_format(bytes, format)?;
    let (w, h) = (img.width(), img.height());
    let resized = downscale(img);
    debug!(
        "Downscaled {}x{} ({} bytes) → {}x{}",
        w,
        h,
        bytes.len(),
        resized.width(),
        resized.height()
    );

    let mut buf = Vec::new();
    if format == ImageFormat::Jpeg {
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
        encoder.encode_image(&resized.to_rgb8())?;
    } else {
        resized.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    }
    Ok(STANDARD.encode(&buf))
}

/// Encode an already-decoded page (e.g. a rasterised PDF page) as PNG.
///
/// PNG keeps rendered text crisp; JPEG artefacts around glyphs hurt
/// recognition more than the extra bytes cost.
pub fn encode_dynamic_image(img: &DynamicImage) -> Result<String, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());
    Ok(b64)
}

/// Shrink so the longest side is at most [`MAX_IMAGE_DIMENSION`],
/// keeping the aspect ratio. Smaller images are returned unchanged.
fn downscale(img: DynamicImage) -> DynamicImage {
    if img.width() <= MAX_IMAGE_DIMENSION && img.height() <= MAX_IMAGE_DIMENSION {
        return img;
    }
    img.resize(
        MAX_IMAGE_DIMENSION,
        MAX_IMAGE_DIMENSION,
        image::imageops::FilterType::Triangle,
    )
}
