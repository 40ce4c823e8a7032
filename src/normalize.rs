//! Icon normalization: decode, resize and re-encode to a fixed-size PNG.
//!
//! SVG content is never rasterized; it is passed through with explicit
//! dimensions so it stays vector.

use crate::html::{ensure_svg_dimensions, SvgRewriteError};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, ImageReader, Limits, RgbaImage};
use std::io::Cursor;

/// Content type of every raster output.
pub const PNG_CONTENT_TYPE: &str = "image/png";
/// Content type of vector pass-through output.
pub const SVG_CONTENT_TYPE: &str = "image/svg+xml";

const ICO_CONTENT_TYPES: &[&str] = &[
    "image/x-icon",
    "image/vnd.microsoft.icon",
    "image/ico",
    "image/icon",
    "image/x-ico",
    "application/ico",
    "application/x-ico",
    "application/x-icon",
];
const SVG_CONTENT_TYPES: &[&str] = &[SVG_CONTENT_TYPE, "image/svg", "application/svg+xml", "text/svg+xml"];

/// Largest edge a raster source may declare before decoding is refused.
pub const MAX_DECODE_DIMENSION: u32 = 4096;

fn decode_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_DECODE_DIMENSION);
    limits.max_image_height = Some(MAX_DECODE_DIMENSION);
    limits
}

/// Media type without parameters, lowercased.
pub fn media_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Formats the normalizer knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// PNG raster.
    Png,
    /// JPEG raster.
    Jpeg,
    /// WebP raster.
    Webp,
    /// GIF raster (first frame).
    Gif,
    /// BMP raster.
    Bmp,
    /// ICO container holding one or more images.
    Ico,
    /// SVG document.
    Svg,
}

impl ContentKind {
    /// Maps a response content type to a decoder.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = media_essence(content_type);
        if ICO_CONTENT_TYPES.contains(&essence.as_str()) {
            return Some(Self::Ico);
        }
        if SVG_CONTENT_TYPES.contains(&essence.as_str()) {
            return Some(Self::Svg);
        }
        match essence.as_str() {
            "image/png" | "image/apng" => Some(Self::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::Webp),
            "image/gif" => Some(Self::Gif),
            "image/bmp" | "image/x-ms-bmp" => Some(Self::Bmp),
            _ => None,
        }
    }

    fn image_format(self) -> Option<ImageFormat> {
        match self {
            Self::Png => Some(ImageFormat::Png),
            Self::Jpeg => Some(ImageFormat::Jpeg),
            Self::Webp => Some(ImageFormat::WebP),
            Self::Gif => Some(ImageFormat::Gif),
            Self::Bmp => Some(ImageFormat::Bmp),
            Self::Ico | Self::Svg => None,
        }
    }
}

/// True when a response content type is acceptable as an icon payload.
pub fn is_image_content_type(content_type: &str) -> bool {
    media_essence(content_type).starts_with("image/")
        || ContentKind::from_content_type(content_type).is_some()
}

/// Errors surfaced while normalizing one candidate.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// No decoder exists for the content type.
    #[error("unsupported content type `{0}`")]
    Unsupported(String),
    /// A raster decoder or the PNG encoder failed.
    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),
    /// The ICO container could not be parsed.
    #[error("ico decode error: {0}")]
    Ico(#[from] std::io::Error),
    /// The ICO container held no images.
    #[error("ico container has no images")]
    EmptyIco,
    /// A pixel buffer did not match its dimensions.
    #[error("raster buffer of {len} bytes does not match {width}x{height} rgba")]
    InvalidRaster {
        /// Claimed width.
        width: u32,
        /// Claimed height.
        height: u32,
        /// Actual buffer length.
        len: usize,
    },
    /// The SVG document could not be rewritten.
    #[error(transparent)]
    Svg(#[from] SvgRewriteError),
}

/// RGBA pixel buffer shared by every decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RasterImage {
    /// Wraps an RGBA buffer, checking `width * height * 4 == pixels.len()`.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, NormalizeError> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4));
        if expected != Some(pixels.len()) {
            return Err(NormalizeError::InvalidRaster {
                width,
                height,
                len: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Pixel width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Pixel height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    fn from_dynamic(image: DynamicImage) -> Self {
        let rgba = image.into_rgba8();
        let (width, height) = rgba.dimensions();
        Self {
            width,
            height,
            pixels: rgba.into_raw(),
        }
    }

    fn into_rgba(self) -> Result<RgbaImage, NormalizeError> {
        let (width, height, len) = (self.width, self.height, self.pixels.len());
        RgbaImage::from_raw(width, height, self.pixels)
            .ok_or(NormalizeError::InvalidRaster { width, height, len })
    }

    /// Stretches the image to exactly `width` x `height`.
    pub fn resize_exact(self, width: u32, height: u32) -> Result<Self, NormalizeError> {
        if self.width == width && self.height == height {
            return Ok(self);
        }
        let rgba = self.into_rgba()?;
        let resized = imageops::resize(&rgba, width, height, FilterType::Lanczos3);
        Ok(Self::from_dynamic(DynamicImage::ImageRgba8(resized)))
    }

    /// Serializes the image as PNG.
    pub fn encode_png(self) -> Result<Vec<u8>, NormalizeError> {
        let image = DynamicImage::ImageRgba8(self.into_rgba()?);
        let mut buffer = Vec::new();
        image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        Ok(buffer)
    }
}

/// Decodes an ICO container, keeping the widest embedded image.
///
/// Ties on width keep the taller image, then the earliest entry.
pub fn decode_ico(bytes: &[u8]) -> Result<RasterImage, NormalizeError> {
    let dir = ico::IconDir::read(Cursor::new(bytes))?;
    let mut best: Option<&ico::IconDirEntry> = None;
    for entry in dir.entries() {
        let better = match best {
            None => true,
            Some(current) => {
                (entry.width(), entry.height()) > (current.width(), current.height())
            }
        };
        if better {
            best = Some(entry);
        }
    }
    let entry = best.ok_or(NormalizeError::EmptyIco)?;
    let image = entry.decode()?;
    RasterImage::from_rgba(image.width(), image.height(), image.rgba_data().to_vec())
}

/// Output of a successful normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedIcon {
    /// Encoded payload.
    pub bytes: Vec<u8>,
    /// Content type of `bytes`.
    pub content_type: String,
}

/// Stateless normalization service.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    size: u32,
}

impl Normalizer {
    /// Builds a normalizer producing `size` x `size` output.
    pub fn new(size: u32) -> Self {
        Self { size: size.max(1) }
    }

    /// Target edge length.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Decodes raster content into an RGBA buffer.
    pub fn decode(&self, bytes: &[u8], kind: ContentKind) -> Result<RasterImage, NormalizeError> {
        if kind == ContentKind::Ico {
            return decode_ico(bytes);
        }
        let format = kind
            .image_format()
            .ok_or_else(|| NormalizeError::Unsupported(format!("{kind:?}")))?;
        let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
        reader.limits(decode_limits());
        Ok(RasterImage::from_dynamic(reader.decode()?))
    }

    /// Normalizes `bytes` according to the authoritative `content_type`.
    pub fn normalize(&self, bytes: &[u8], content_type: &str) -> Result<NormalizedIcon, NormalizeError> {
        let kind = ContentKind::from_content_type(content_type)
            .ok_or_else(|| NormalizeError::Unsupported(media_essence(content_type)))?;
        if kind == ContentKind::Svg {
            return Ok(NormalizedIcon {
                bytes: ensure_svg_dimensions(bytes, self.size, self.size)?,
                content_type: SVG_CONTENT_TYPE.to_string(),
            });
        }
        let png = self
            .decode(bytes, kind)?
            .resize_exact(self.size, self.size)?
            .encode_png()?;
        Ok(NormalizedIcon {
            bytes: png,
            content_type: PNG_CONTENT_TYPE.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn ico_bytes(sizes: &[u32]) -> Vec<u8> {
        let mut dir = ico::IconDir::new(ico::ResourceType::Icon);
        for &size in sizes {
            let shade = size as u8;
            let rgba: Vec<u8> = (0..size * size)
                .flat_map(|_| [shade, shade, shade, 255])
                .collect();
            let image = ico::IconImage::from_rgba_data(size, size, rgba);
            dir.add_entry(ico::IconDirEntry::encode(&image).unwrap());
        }
        let mut buffer = Vec::new();
        dir.write(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn maps_content_types() {
        assert_eq!(ContentKind::from_content_type("image/PNG; charset=binary"), Some(ContentKind::Png));
        assert_eq!(ContentKind::from_content_type("image/vnd.microsoft.icon"), Some(ContentKind::Ico));
        assert_eq!(ContentKind::from_content_type("application/x-icon"), Some(ContentKind::Ico));
        assert_eq!(ContentKind::from_content_type("image/svg+xml"), Some(ContentKind::Svg));
        assert_eq!(ContentKind::from_content_type("image/avif"), None);
        assert!(is_image_content_type("image/avif"));
        assert!(is_image_content_type("application/ico"));
        assert!(!is_image_content_type("text/html; charset=utf-8"));
    }

    #[test]
    fn png_round_trips_to_target_box() {
        let normalizer = Normalizer::new(64);
        for (w, h) in [(16, 16), (300, 120), (1, 513)] {
            let out = normalizer.normalize(&png_bytes(w, h), "image/png").unwrap();
            assert_eq!(out.content_type, PNG_CONTENT_TYPE);
            let decoded = image::load_from_memory_with_format(&out.bytes, ImageFormat::Png).unwrap();
            assert_eq!(decoded.dimensions(), (64, 64));
        }
    }

    #[test]
    fn ico_selects_widest_entry() {
        let bytes = ico_bytes(&[16, 48, 32]);
        let raster = decode_ico(&bytes).unwrap();
        assert_eq!((raster.width(), raster.height()), (48, 48));
        assert_eq!(&raster.pixels()[..4], &[48, 48, 48, 255]);

        let out = Normalizer::new(32).normalize(&bytes, "image/x-icon").unwrap();
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (32, 32));
    }

    #[test]
    fn svg_passes_through_with_dimensions() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24"><path d="M0 0h24v24H0z"/></svg>"#;
        let out = Normalizer::new(64).normalize(svg, "image/svg+xml").unwrap();
        assert_eq!(out.content_type, SVG_CONTENT_TYPE);
        let text = String::from_utf8(out.bytes).unwrap();
        assert!(text.contains(r#"width="64""#));
        assert!(text.contains(r#"height="64""#));
        assert!(text.contains(r#"<path d="M0 0h24v24H0z"/>"#));
    }

    #[test]
    fn rejects_unsupported_and_corrupt_input() {
        let normalizer = Normalizer::new(64);
        assert!(matches!(
            normalizer.normalize(b"whatever", "image/avif"),
            Err(NormalizeError::Unsupported(_))
        ));
        assert!(matches!(
            normalizer.normalize(b"not a png at all", "image/png"),
            Err(NormalizeError::Codec(_))
        ));
        assert!(normalizer.normalize(b"garbage", "image/x-icon").is_err());
    }

    #[test]
    fn refuses_oversized_raster_before_decoding() {
        let normalizer = Normalizer::new(64);
        let wide = png_bytes(MAX_DECODE_DIMENSION + 1, 1);
        assert!(matches!(
            normalizer.normalize(&wide, "image/png"),
            Err(NormalizeError::Codec(image::ImageError::Limits(_)))
        ));
        let edge = png_bytes(MAX_DECODE_DIMENSION, 1);
        assert!(normalizer.normalize(&edge, "image/png").is_ok());
    }

    #[test]
    fn raster_checks_buffer_length() {
        assert!(RasterImage::from_rgba(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            RasterImage::from_rgba(2, 2, vec![0; 15]),
            Err(NormalizeError::InvalidRaster { len: 15, .. })
        ));
    }
}
