use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chatdesk_contracts::session::ImageAttachment;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

pub const MAX_IMAGE_DIM: u32 = 1024;
const JPEG_QUALITY: u8 = 90;

/// Reads an image from disk for sending alongside a prompt. Large images are
/// downscaled to `MAX_IMAGE_DIM` on the longest side and re-encoded as JPEG;
/// anything the decoder can't handle goes out as the original bytes.
pub fn load_image_attachment(path: impl AsRef<Path>) -> Result<ImageAttachment> {
    let path = path.as_ref();
    let Some(source_mime) = mime_for_path(path) else {
        bail!(
            "unsupported image type: {} (expected png, jpg or jpeg)",
            path.display()
        );
    };
    let raw = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    let sha256 = hex::encode(Sha256::digest(&raw));

    let (bytes, mime_type) = match prepare_jpeg(&raw) {
        Ok(bytes) => (bytes, "image/jpeg"),
        Err(err) => {
            warn!(path = %path.display(), "image re-encode failed, sending original: {err:#}");
            (raw, source_mime)
        }
    };
    debug!(path = %path.display(), bytes = bytes.len(), mime_type, "image attached");
    Ok(ImageAttachment {
        path: path.to_string_lossy().to_string(),
        mime_type: mime_type.to_string(),
        data: BASE64.encode(bytes),
        sha256,
    })
}

fn prepare_jpeg(raw: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(raw).context("failed to decode image")?;
    let flattened = flatten_alpha(&decoded);
    let (width, height) = flattened.dimensions();
    let fitted = if width.max(height) > MAX_IMAGE_DIM {
        flattened.resize(MAX_IMAGE_DIM, MAX_IMAGE_DIM, FilterType::Triangle)
    } else {
        flattened
    };
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
    encoder
        .encode_image(&DynamicImage::ImageRgb8(fitted.to_rgb8()))
        .context("failed to encode JPEG")?;
    Ok(bytes)
}

/// Composites transparent pixels over white; JPEG has no alpha channel.
fn flatten_alpha(image: &DynamicImage) -> DynamicImage {
    let rgba = image.to_rgba8();
    let mut flattened = RgbaImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend =
            |channel: u8| -> u8 { (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8 };
        flattened.put_pixel(
            x,
            y,
            Rgba([blend(pixel[0]), blend(pixel[1]), blend(pixel[2]), 255]),
        );
    }
    DynamicImage::ImageRgba8(flattened)
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use base64::Engine as _;
    use image::{GenericImageView, Rgba, RgbaImage};

    use super::{load_image_attachment, BASE64, MAX_IMAGE_DIM};

    #[test]
    fn large_png_is_downscaled_to_jpeg() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("wide.png");
        RgbaImage::from_pixel(2048, 512, Rgba([10, 200, 30, 128])).save(&path)?;

        let attachment = load_image_attachment(&path)?;
        assert_eq!(attachment.mime_type, "image/jpeg");
        assert_eq!(attachment.sha256.len(), 64);
        let decoded = image::load_from_memory(&BASE64.decode(&attachment.data)?)?;
        assert_eq!(decoded.dimensions(), (MAX_IMAGE_DIM, 256));
        Ok(())
    }

    #[test]
    fn small_image_keeps_its_size() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("small.PNG");
        RgbaImage::from_pixel(40, 30, Rgba([0, 0, 0, 255])).save_with_format(&path, image::ImageFormat::Png)?;

        let attachment = load_image_attachment(&path)?;
        let decoded = image::load_from_memory(&BASE64.decode(&attachment.data)?)?;
        assert_eq!(decoded.dimensions(), (40, 30));
        Ok(())
    }

    #[test]
    fn undecodable_jpeg_falls_back_to_raw_bytes() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("broken.jpg");
        fs::write(&path, b"not really a jpeg")?;

        let attachment = load_image_attachment(&path)?;
        assert_eq!(attachment.mime_type, "image/jpeg");
        assert_eq!(BASE64.decode(&attachment.data)?, b"not really a jpeg");
        Ok(())
    }

    #[test]
    fn rejects_other_extensions() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("anim.gif");
        fs::write(&path, b"GIF89a")?;
        assert!(load_image_attachment(&path).is_err());
        assert!(load_image_attachment(temp.path().join("missing.png")).is_err());
        Ok(())
    }
}
