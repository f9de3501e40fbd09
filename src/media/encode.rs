//! Raster re-encoding
//!
//! Every stored image is decoded and re-encoded, so the store only ever holds
//! PNG or JPEG produced by this crate, whatever the source format was.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// Default JPEG quality
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Output format name as used in configuration and on the command line.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    #[default]
    Jpeg,
}

/// Target encoding for stored images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    /// Lossless, default compression.
    Png,
    /// Lossy; alpha is flattened onto white.
    Jpeg { quality: u8 },
}

impl Default for RasterFormat {
    fn default() -> Self {
        RasterFormat::Jpeg {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl RasterFormat {
    pub fn new(format: OutputFormat, jpeg_quality: u8) -> Self {
        match format {
            OutputFormat::Png => RasterFormat::Png,
            OutputFormat::Jpeg => RasterFormat::Jpeg {
                quality: jpeg_quality,
            },
        }
    }

    /// File extension written by the store.
    pub fn extension(&self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpeg { .. } => "jpg",
        }
    }
}

/// Re-encoded image bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Decode `bytes` as any supported raster format and re-encode to `format`.
pub fn reencode(bytes: &[u8], format: RasterFormat) -> Result<EncodedImage, image::ImageError> {
    let decoded = image::load_from_memory(bytes)?;
    let (width, height) = (decoded.width(), decoded.height());

    let mut out = Vec::new();
    match format {
        RasterFormat::Png => {
            let encodable = match decoded {
                DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
                    DynamicImage::ImageRgba8(decoded.to_rgba8())
                }
                other => other,
            };
            let encoder = PngEncoder::new_with_quality(
                &mut out,
                CompressionType::Default,
                FilterType::Adaptive,
            );
            encodable.write_with_encoder(encoder)?;
        }
        RasterFormat::Jpeg { quality } => {
            let flat = DynamicImage::ImageRgb8(flatten_on_white(&decoded));
            let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
            flat.write_with_encoder(encoder)?;
        }
    }

    tracing::trace!(
        width,
        height,
        input = bytes.len(),
        output = out.len(),
        "re-encoded image"
    );
    Ok(EncodedImage {
        bytes: out,
        extension: format.extension(),
        width,
        height,
    })
}

/// Composite onto an opaque white background.
fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        rgb.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn sample(format: ImageFormat, pixel: Rgba<u8>) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 2, pixel));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_png_roundtrip_is_png() {
        let src = sample(ImageFormat::Png, Rgba([10, 20, 30, 255]));
        let out = reencode(&src, RasterFormat::Png).unwrap();
        assert_eq!(out.extension, "png");
        assert_eq!((out.width, out.height), (3, 2));
        assert_eq!(image::guess_format(&out.bytes).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn test_jpeg_output_from_png_with_alpha() {
        let src = sample(ImageFormat::Png, Rgba([0, 0, 0, 0]));
        let out = reencode(&src, RasterFormat::default()).unwrap();
        assert_eq!(out.extension, "jpg");
        assert_eq!(image::guess_format(&out.bytes).unwrap(), ImageFormat::Jpeg);

        // Fully transparent black flattens to white.
        let decoded = image::load_from_memory(&out.bytes).unwrap().to_rgb8();
        let px = decoded.get_pixel(1, 1).0;
        assert!(px.iter().all(|c| *c > 240), "expected white, got {px:?}");
    }

    #[test]
    fn test_gif_source_accepted() {
        let src = sample(ImageFormat::Gif, Rgba([200, 0, 0, 255]));
        let out = reencode(&src, RasterFormat::Png).unwrap();
        assert_eq!(image::guess_format(&out.bytes).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn test_reencode_is_deterministic() {
        let src = sample(ImageFormat::Png, Rgba([1, 2, 3, 255]));
        let a = reencode(&src, RasterFormat::Jpeg { quality: 70 }).unwrap();
        let b = reencode(&src, RasterFormat::Jpeg { quality: 70 }).unwrap();
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(reencode(b"definitely not an image", RasterFormat::Png).is_err());
        assert!(reencode(&[], RasterFormat::Png).is_err());
    }

    #[test]
    fn test_format_from_config() {
        assert_eq!(RasterFormat::new(OutputFormat::Png, 50), RasterFormat::Png);
        assert_eq!(
            RasterFormat::new(OutputFormat::Jpeg, 50),
            RasterFormat::Jpeg { quality: 50 }
        );
        assert_eq!(RasterFormat::Png.extension(), "png");
    }

    #[test]
    fn test_flatten_keeps_opaque_pixels() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([12, 34, 56, 255])));
        assert_eq!(flatten_on_white(&img).get_pixel(0, 0).0, [12, 34, 56]);
    }
}
