//! Transform back end over the `image` ecosystem.
//!
//! One transform is decode → orient → resize → encode, file to file. The
//! engine is process-wide: its decode limit is set once at boot and shared by
//! every concurrent transform. Exceeding the limit fails that one transform,
//! never the process.

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use image::codecs::gif::GifDecoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::imageops::{self, FilterType};
use image::{AnimationDecoder, DynamicImage, ImageFormat, ImageReader};
use tracing::debug;

use crate::domain::entities::OutputFormat;
use crate::domain::errors::TransformError;
use crate::domain::ports::{TransformBackend, TransformJob};
use crate::infrastructure::cache::{disk, write_atomic};

/// Decoded RGBA pixels cost four bytes each; the boot-time memory ceiling
/// divides down to a pixel budget per decode.
const BYTES_PER_PIXEL: u64 = 4;

/// EXIF orientation decomposed into clockwise quarter turns followed by a
/// horizontal flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Orientation {
    quarter_turns: u8,
    flip_x: bool,
}

/// Bundled [`TransformBackend`] implementation.
#[derive(Debug, Default)]
pub struct ImageEngine {
    /// Maximum pixel count per decode; zero means unlimited.
    max_pixels: AtomicU64,
}

impl ImageEngine {
    /// Creates an engine with no decode limit; call
    /// [`TransformBackend::init`] before serving.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransformBackend for ImageEngine {
    fn init(&self, memory_limit_bytes: u64) -> Result<(), TransformError> {
        self.max_pixels
            .store(memory_limit_bytes / BYTES_PER_PIXEL, Ordering::Relaxed);
        Ok(())
    }

    fn transform(&self, job: &TransformJob) -> Result<(), TransformError> {
        let bytes = std::fs::read(&job.input)?;

        let format = sniff_format(&bytes, job.apng_hint)?;
        if is_animated(&bytes, format)? {
            return Err(TransformError::AnimatedInput);
        }

        let (width, height) = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()?
            .into_dimensions()
            .map_err(TransformError::decode)?;
        let pixels = u64::from(width) * u64::from(height);
        let limit = self.max_pixels.load(Ordering::Relaxed);
        if limit > 0 && pixels > limit {
            return Err(TransformError::MemoryLimit {
                required: pixels,
                limit,
            });
        }

        let mut img =
            image::load_from_memory_with_format(&bytes, format).map_err(TransformError::decode)?;

        if let Some(orientation) = exif_orientation(&bytes) {
            img = apply_orientation(img, orientation);
        }

        if let Some((target_w, target_h)) =
            target_size(img.width(), img.height(), job.width, job.height)
        {
            debug!(
                from_w = img.width(),
                from_h = img.height(),
                to_w = target_w,
                to_h = target_h,
                "resizing"
            );
            img = img.resize_exact(target_w, target_h, FilterType::CatmullRom);
        }

        let encoded = encode(&img, job.format, job.quality)?;
        if job.format == OutputFormat::PngQuantized {
            quantize_into(&job.output, &encoded)
        } else {
            write_atomic(&job.output, &encoded).map_err(TransformError::Io)
        }
    }
}

fn sniff_format(bytes: &[u8], apng_hint: bool) -> Result<ImageFormat, TransformError> {
    match image::guess_format(bytes) {
        Ok(format) => Ok(format),
        // The URL promised an APNG; let the PNG decoder have the final word.
        Err(_) if apng_hint => Ok(ImageFormat::Png),
        Err(e) => Err(TransformError::decode(e)),
    }
}

/// Multi-frame inputs are served as-is, so the decoders are only asked for
/// frame structure, never full frames.
fn is_animated(bytes: &[u8], format: ImageFormat) -> Result<bool, TransformError> {
    match format {
        ImageFormat::Gif => {
            let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(TransformError::decode)?;
            let frames = decoder.into_frames().take(2).filter_map(Result::ok).count();
            Ok(frames > 1)
        }
        ImageFormat::Png => {
            let decoder = PngDecoder::new(Cursor::new(bytes)).map_err(TransformError::decode)?;
            decoder.is_apng().map_err(TransformError::decode)
        }
        ImageFormat::WebP => {
            let decoder = WebPDecoder::new(Cursor::new(bytes)).map_err(TransformError::decode)?;
            Ok(decoder.has_animation())
        }
        _ => Ok(false),
    }
}

fn exif_orientation(bytes: &[u8]) -> Option<Orientation> {
    let mut cursor = Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    orientation_from_tag(field.value.get_uint(0)?)
}

/// The eight EXIF orientations as quarter turns plus an optional flip.
fn orientation_from_tag(tag: u32) -> Option<Orientation> {
    let (quarter_turns, flip_x) = match tag {
        2 => (0, true),  // flip horizontal
        3 => (2, false), // rotate 180
        4 => (2, true),  // flip vertical
        5 => (1, true),  // transpose
        6 => (1, false), // rotate 90 CW
        7 => (3, true),  // transverse
        8 => (3, false), // rotate 90 CCW
        _ => return None,
    };
    Some(Orientation {
        quarter_turns,
        flip_x,
    })
}

fn apply_orientation(img: DynamicImage, orientation: Orientation) -> DynamicImage {
    let mut rgba = img.into_rgba8();
    match orientation.quarter_turns % 4 {
        1 => rgba = imageops::rotate90(&rgba),
        2 => rgba = imageops::rotate180(&rgba),
        3 => rgba = imageops::rotate270(&rgba),
        _ => {}
    }
    if orientation.flip_x {
        rgba = imageops::flip_horizontal(&rgba);
    }
    DynamicImage::ImageRgba8(rgba)
}

/// Resolves the requested dimensions against the (post-orientation)
/// originals. `None` means no resize is needed. A zero axis follows the
/// other axis at the original aspect ratio; both zero means re-encode only;
/// no axis ever exceeds its original.
fn target_size(
    original_w: u32,
    original_h: u32,
    requested_w: u32,
    requested_h: u32,
) -> Option<(u32, u32)> {
    if original_w == 0 || original_h == 0 {
        return None;
    }
    let target_w = requested_w.min(original_w);
    let target_h = requested_h.min(original_h);
    if (target_w == 0 || target_w == original_w) && (target_h == 0 || target_h == original_h) {
        return None;
    }
    let (target_w, target_h) = if target_w == 0 {
        (scaled_edge(target_h, original_w, original_h), target_h)
    } else if target_h == 0 {
        (target_w, scaled_edge(target_w, original_h, original_w))
    } else {
        (target_w, target_h)
    };
    Some((
        target_w.clamp(1, original_w),
        target_h.clamp(1, original_h),
    ))
}

/// `round(edge * numerator / denominator)` in integer arithmetic.
#[allow(clippy::cast_possible_truncation)]
fn scaled_edge(edge: u32, numerator: u32, denominator: u32) -> u32 {
    let scaled =
        (u64::from(edge) * u64::from(numerator) + u64::from(denominator) / 2) / u64::from(denominator);
    scaled as u32
}

fn encode(
    img: &DynamicImage,
    format: OutputFormat,
    quality: u8,
) -> Result<Vec<u8>, TransformError> {
    match format {
        OutputFormat::Webp => {
            let rgba = img.to_rgba8();
            let (width, height) = rgba.dimensions();
            let encoder = webp::Encoder::from_rgba(rgba.as_raw(), width, height);
            Ok(encoder.encode(f32::from(quality)).to_vec())
        }
        OutputFormat::Jpeg => {
            // JPEG carries no alpha channel.
            let rgb = img.to_rgb8();
            let mut buffer = Cursor::new(Vec::new());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, quality))
                .map_err(TransformError::encode)?;
            Ok(buffer.into_inner())
        }
        OutputFormat::Png | OutputFormat::PngQuantized => {
            let mut buffer = Cursor::new(Vec::new());
            img.write_to(&mut buffer, ImageFormat::Png)
                .map_err(TransformError::encode)?;
            Ok(buffer.into_inner())
        }
        OutputFormat::Gif => {
            let mut buffer = Cursor::new(Vec::new());
            img.write_to(&mut buffer, ImageFormat::Gif)
                .map_err(TransformError::encode)?;
            Ok(buffer.into_inner())
        }
    }
}

/// `pngq`: materialize the PNG under a scratch name, run `pngquant` over it
/// in place, then rename the quantized result into the visible path.
fn quantize_into(output: &Path, png_bytes: &[u8]) -> Result<(), TransformError> {
    let scratch = disk::tmp_sibling(output);
    std::fs::write(&scratch, png_bytes)?;

    let status = std::process::Command::new("pngquant")
        .arg("--force")
        .arg("--output")
        .arg(&scratch)
        .arg("--quality")
        .arg("65-85")
        .arg(&scratch)
        .status();

    match status {
        Ok(status) if status.success() => {
            std::fs::rename(&scratch, output).map_err(TransformError::Io)
        }
        Ok(status) => {
            let _ = std::fs::remove_file(&scratch);
            Err(TransformError::Quantizer(format!(
                "pngquant exited with {status}"
            )))
        }
        Err(e) => {
            let _ = std::fs::remove_file(&scratch);
            Err(TransformError::Quantizer(format!(
                "failed to launch pngquant: {e}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Frame, Rgba, RgbaImage};
    use std::path::PathBuf;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    /// 2x2 probe image: R G / B W.
    fn probe() -> DynamicImage {
        let mut img = RgbaImage::new(2, 2);
        img.put_pixel(0, 0, RED);
        img.put_pixel(1, 0, GREEN);
        img.put_pixel(0, 1, BLUE);
        img.put_pixel(1, 1, WHITE);
        DynamicImage::ImageRgba8(img)
    }

    fn pixels(img: &DynamicImage) -> Vec<Rgba<u8>> {
        let rgba = img.to_rgba8();
        rgba.pixels().copied().collect()
    }

    fn oriented(tag: u32) -> Vec<Rgba<u8>> {
        let orientation = orientation_from_tag(tag).unwrap();
        pixels(&apply_orientation(probe(), orientation))
    }

    #[test]
    fn test_orientation_identity_tags() {
        assert!(orientation_from_tag(1).is_none());
        assert!(orientation_from_tag(0).is_none());
        assert!(orientation_from_tag(9).is_none());
    }

    #[test]
    fn test_orientation_flip_horizontal() {
        assert_eq!(oriented(2), vec![GREEN, RED, WHITE, BLUE]);
    }

    #[test]
    fn test_orientation_rotate_180() {
        assert_eq!(oriented(3), vec![WHITE, BLUE, GREEN, RED]);
    }

    #[test]
    fn test_orientation_flip_vertical() {
        assert_eq!(oriented(4), vec![BLUE, WHITE, RED, GREEN]);
    }

    #[test]
    fn test_orientation_transpose() {
        // (x, y) -> (y, x): G and B swap.
        assert_eq!(oriented(5), vec![RED, BLUE, GREEN, WHITE]);
    }

    #[test]
    fn test_orientation_rotate_90_cw() {
        // Left column (R, B) becomes the top row (B, R).
        assert_eq!(oriented(6), vec![BLUE, RED, WHITE, GREEN]);
    }

    #[test]
    fn test_orientation_transverse() {
        assert_eq!(oriented(7), vec![WHITE, GREEN, BLUE, RED]);
    }

    #[test]
    fn test_orientation_rotate_90_ccw() {
        assert_eq!(oriented(8), vec![GREEN, WHITE, RED, BLUE]);
    }

    #[test]
    fn test_target_size_exact() {
        assert_eq!(target_size(500, 500, 100, 100), Some((100, 100)));
        assert_eq!(target_size(400, 200, 300, 50), Some((300, 50)));
    }

    #[test]
    fn test_target_size_passthrough() {
        assert_eq!(target_size(500, 500, 0, 0), None);
        assert_eq!(target_size(500, 500, 500, 500), None);
        // Upscales clamp back to the original, which is a no-op.
        assert_eq!(target_size(500, 500, 1000, 1000), None);
        assert_eq!(target_size(500, 500, 0, 500), None);
    }

    #[test]
    fn test_target_size_aspect_fill() {
        assert_eq!(target_size(400, 200, 100, 0), Some((100, 50)));
        assert_eq!(target_size(400, 200, 0, 100), Some((200, 100)));
        assert_eq!(target_size(200, 400, 0, 100), Some((50, 100)));
        // Rounding, not truncation: 100 * 3 / 2 = 150, 3 / 2 rounds to 2.
        assert_eq!(target_size(3, 2, 0, 1), Some((2, 1)));
    }

    #[test]
    fn test_target_size_never_upscales() {
        assert_eq!(target_size(400, 200, 1000, 100), Some((400, 100)));
        assert_eq!(target_size(10, 10, 5, 1000), Some((5, 10)));
    }

    fn engine() -> ImageEngine {
        let engine = ImageEngine::new();
        engine.init(512 * 1024 * 1024).unwrap();
        engine
    }

    fn write_probe_png(dir: &Path, size: u32) -> PathBuf {
        let mut img = RgbaImage::new(size, size);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = if (x + y) % 2 == 0 { RED } else { BLUE };
        }
        let path = dir.join("input");
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        std::fs::write(&path, buffer.into_inner()).unwrap();
        path
    }

    fn job(input: PathBuf, output: PathBuf, w: u32, h: u32, format: OutputFormat) -> TransformJob {
        TransformJob {
            input,
            output,
            width: w,
            height: h,
            quality: 80,
            format,
            apng_hint: false,
        }
    }

    #[test]
    fn test_transform_resizes_and_encodes_webp() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = write_probe_png(dir.path(), 8);
        let output = dir.path().join("out.webp");

        engine()
            .transform(&job(input, output.clone(), 4, 4, OutputFormat::Webp))
            .unwrap();

        let bytes = std::fs::read(&output).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::WebP);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 4));
    }

    #[test]
    fn test_transform_jpeg_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = write_probe_png(dir.path(), 8);
        let output = dir.path().join("out.jpeg");

        engine()
            .transform(&job(input, output.clone(), 2, 2, OutputFormat::Jpeg))
            .unwrap();

        let bytes = std::fs::read(&output).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_transform_never_upscales() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = write_probe_png(dir.path(), 4);
        let output = dir.path().join("out.png");

        engine()
            .transform(&job(input, output.clone(), 100, 100, OutputFormat::Png))
            .unwrap();

        let decoded = image::load_from_memory(&std::fs::read(&output).unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 4));
    }

    #[test]
    fn test_transform_refuses_animated_gif() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut gif = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut gif);
            encoder
                .encode_frame(Frame::new(RgbaImage::new(2, 2)))
                .unwrap();
            encoder
                .encode_frame(Frame::new(RgbaImage::new(2, 2)))
                .unwrap();
        }
        let input = dir.path().join("anim.gif");
        std::fs::write(&input, &gif).unwrap();
        let output = dir.path().join("out.webp");

        let err = engine()
            .transform(&job(input, output.clone(), 1, 1, OutputFormat::Webp))
            .unwrap_err();
        assert!(matches!(err, TransformError::AnimatedInput));
        assert!(!output.exists());
    }

    #[test]
    fn test_transform_single_frame_gif_is_processed() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut gif = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut gif);
            encoder
                .encode_frame(Frame::new(RgbaImage::new(2, 2)))
                .unwrap();
        }
        let input = dir.path().join("still.gif");
        std::fs::write(&input, &gif).unwrap();
        let output = dir.path().join("out.webp");

        engine()
            .transform(&job(input, output.clone(), 1, 1, OutputFormat::Webp))
            .unwrap();
        assert!(output.exists());
    }

    #[test]
    fn test_memory_limit_fails_single_transform() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = write_probe_png(dir.path(), 8);
        let output = dir.path().join("out.webp");

        let small = ImageEngine::new();
        // 16 bytes of budget is 4 pixels; an 8x8 input is 64.
        small.init(16).unwrap();
        let err = small
            .transform(&job(input.clone(), output.clone(), 2, 2, OutputFormat::Webp))
            .unwrap_err();
        assert!(matches!(err, TransformError::MemoryLimit { .. }));

        // The same engine keeps serving once re-initialized wider.
        small.init(512 * 1024 * 1024).unwrap();
        small
            .transform(&job(input, output, 2, 2, OutputFormat::Webp))
            .unwrap();
    }

    #[test]
    fn test_transform_missing_input_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = engine()
            .transform(&job(
                dir.path().join("absent"),
                dir.path().join("out.webp"),
                1,
                1,
                OutputFormat::Webp,
            ))
            .unwrap_err();
        assert!(matches!(err, TransformError::Io(_)));
    }
}
