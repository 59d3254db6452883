//! Image decoding for wall-mounted artwork: RGBA pixels plus a representative colour.

use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Longest texture edge kept after decoding; larger images are downscaled.
pub const MAX_TEXTURE_EDGE: u32 = 2048;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug)]
pub enum ImageLoadError {
    Io { path: PathBuf, source: std::io::Error },
    UnsupportedFormat(PathBuf),
    Decode { path: PathBuf, message: String },
    EmptyImage(PathBuf),
}

impl fmt::Display for ImageLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageLoadError::Io { path, source } => {
                write!(f, "read {} failed: {}", path.display(), source)
            }
            ImageLoadError::UnsupportedFormat(path) => {
                write!(f, "unsupported image format: {}", path.display())
            }
            ImageLoadError::Decode { path, message } => {
                write!(f, "decode {} failed: {}", path.display(), message)
            }
            ImageLoadError::EmptyImage(path) => write!(f, "image has no pixels: {}", path.display()),
        }
    }
}

impl std::error::Error for ImageLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImageLoadError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Decoded image as tightly packed RGBA8 rows, top row first.
#[derive(Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Arc<[u8]>,
    /// Mean colour of all pixels, sRGB channels scaled to 0..1.
    pub mean_rgb: [f32; 3],
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .field("mean_rgb", &self.mean_rgb)
            .finish()
    }
}

impl DecodedImage {
    /// `rgba` must hold exactly `width * height * 4` bytes.
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, String> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(format!(
                "{}x{} image needs {} bytes, got {}",
                width,
                height,
                expected,
                rgba.len()
            ));
        }
        let mean_rgb = mean_rgb(&rgba);
        Ok(Self {
            width,
            height,
            rgba: rgba.into(),
            mean_rgb,
        })
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// Downscales so neither edge exceeds `max_edge`, keeping the aspect ratio.
    pub fn fit_within(self, max_edge: u32) -> Self {
        if self.width <= max_edge && self.height <= max_edge {
            return self;
        }
        let Some(buffer) =
            ::image::RgbaImage::from_raw(self.width, self.height, self.rgba.to_vec())
        else {
            return self;
        };
        let scale = max_edge as f32 / self.width.max(self.height) as f32;
        let width = ((self.width as f32 * scale).round() as u32).clamp(1, max_edge);
        let height = ((self.height as f32 * scale).round() as u32).clamp(1, max_edge);
        let scaled = ::image::imageops::thumbnail(&buffer, width, height);
        Self {
            width,
            height,
            rgba: scaled.into_raw().into(),
            mean_rgb: self.mean_rgb,
        }
    }
}

/// Reads and decodes `path`. The format is taken from the file's contents, so
/// extensionless paths work as long as the bytes are PNG, JPEG or WebP.
pub fn load_image(path: &Path) -> Result<DecodedImage, ImageLoadError> {
    let bytes = fs::read(path).map_err(|source| ImageLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if !is_supported(&bytes) {
        return Err(ImageLoadError::UnsupportedFormat(path.to_path_buf()));
    }
    let decoded = decode(&bytes).map_err(|message| ImageLoadError::Decode {
        path: path.to_path_buf(),
        message,
    })?;
    if decoded.width == 0 || decoded.height == 0 {
        return Err(ImageLoadError::EmptyImage(path.to_path_buf()));
    }
    Ok(decoded.fit_within(MAX_TEXTURE_EDGE))
}

fn is_supported(bytes: &[u8]) -> bool {
    bytes.starts_with(&PNG_SIGNATURE)
        || matches!(
            ::image::guess_format(bytes),
            Ok(::image::ImageFormat::Jpeg | ::image::ImageFormat::WebP)
        )
}

pub fn decode(bytes: &[u8]) -> Result<DecodedImage, String> {
    if bytes.starts_with(&PNG_SIGNATURE) {
        return decode_png(bytes);
    }
    let decoded = ::image::load_from_memory(bytes).map_err(|err| err.to_string())?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    DecodedImage::from_rgba(width, height, rgba.into_raw())
}

pub fn decode_png(bytes: &[u8]) -> Result<DecodedImage, String> {
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().map_err(|err| err.to_string())?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let output = reader.next_frame(&mut buf).map_err(|err| err.to_string())?;
    let bytes = &buf[..output.buffer_size()];
    let channels = match output.color_type {
        png::ColorType::Rgba => 4,
        png::ColorType::Rgb => 3,
        png::ColorType::GrayscaleAlpha => 2,
        png::ColorType::Grayscale => 1,
        _ => return Err("unsupported png color type".to_string()),
    };
    let rgba: Vec<u8> = bytes
        .chunks_exact(channels)
        .flat_map(|pixel| match channels {
            4 => [pixel[0], pixel[1], pixel[2], pixel[3]],
            3 => [pixel[0], pixel[1], pixel[2], u8::MAX],
            2 => [pixel[0], pixel[0], pixel[0], pixel[1]],
            _ => [pixel[0], pixel[0], pixel[0], u8::MAX],
        })
        .collect();
    DecodedImage::from_rgba(output.width, output.height, rgba)
}

fn mean_rgb(rgba: &[u8]) -> [f32; 3] {
    let mut sum = [0u64; 3];
    let mut count = 0u64;
    for pixel in rgba.chunks_exact(4) {
        for (total, value) in sum.iter_mut().zip(&pixel[..3]) {
            *total += u64::from(*value);
        }
        count += 1;
    }
    if count == 0 {
        return [0.0; 3];
    }
    let scale = 1.0 / (count as f32 * 255.0);
    sum.map(|total| total as f32 * scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn encode_rgb(width: u32, height: u32, pixel: [u8; 3]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, width, height);
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            let data: Vec<u8> = (0..width * height).flat_map(|_| pixel).collect();
            writer.write_image_data(&data).unwrap();
        }
        out
    }

    fn encode_jpeg(width: u32, height: u32, pixel: [u8; 3]) -> Vec<u8> {
        let mut out = Vec::new();
        ::image::RgbImage::from_pixel(width, height, ::image::Rgb(pixel))
            .write_to(&mut Cursor::new(&mut out), ::image::ImageFormat::Jpeg)
            .unwrap();
        out
    }

    fn temp_file(name: &str, bytes: &[u8]) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let dir = std::env::temp_dir().join(format!("engine_core_image_{}", nanos));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn png_keeps_size_pixels_and_mean() {
        let bytes = encode_rgb(4, 2, [255, 0, 51]);
        let image = decode(&bytes).unwrap();
        assert_eq!((image.width, image.height), (4, 2));
        assert!((image.aspect_ratio() - 2.0).abs() < 1e-6);
        assert_eq!(image.rgba.len(), 4 * 2 * 4);
        assert_eq!(&image.rgba[..4], &[255, 0, 51, 255]);
        assert!((image.mean_rgb[0] - 1.0).abs() < 1e-6);
        assert!(image.mean_rgb[1].abs() < 1e-6);
        assert!((image.mean_rgb[2] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn jpeg_decodes_to_rgba() {
        let bytes = encode_jpeg(6, 3, [200, 40, 40]);
        let image = decode(&bytes).unwrap();
        assert_eq!((image.width, image.height), (6, 3));
        assert_eq!(image.rgba.len(), 6 * 3 * 4);
        assert!(image.rgba.chunks_exact(4).all(|pixel| pixel[3] == 255));
        assert!((image.mean_rgb[0] - 200.0 / 255.0).abs() < 0.05);
        assert!((image.mean_rgb[1] - 40.0 / 255.0).abs() < 0.05);
    }

    #[test]
    fn format_comes_from_contents_not_extension() {
        let path = temp_file("portrait", &encode_jpeg(2, 4, [10, 20, 30]));
        let image = load_image(&path).unwrap();
        assert_eq!((image.width, image.height), (2, 4));
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn unknown_bytes_are_unsupported() {
        let path = temp_file("portrait.png", b"not an image at all");
        let err = load_image(&path).unwrap_err();
        assert!(matches!(err, ImageLoadError::UnsupportedFormat(_)));
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn truncated_png_fails_to_decode() {
        let bytes = encode_rgb(4, 4, [1, 2, 3]);
        assert!(decode(&bytes[..20]).is_err());
    }

    #[test]
    fn oversized_images_are_scaled_to_fit() {
        let image = DecodedImage::from_rgba(400, 100, vec![128; 400 * 100 * 4]).unwrap();
        let fitted = image.fit_within(200);
        assert_eq!((fitted.width, fitted.height), (200, 50));
        assert_eq!(fitted.rgba.len(), 200 * 50 * 4);
    }

    #[test]
    fn pixel_count_must_match_dimensions() {
        assert!(DecodedImage::from_rgba(2, 2, vec![0; 15]).is_err());
    }

    #[test]
    fn missing_file_reports_io_error() {
        let err = load_image(Path::new("definitely/missing/portrait.png")).unwrap_err();
        assert!(matches!(err, ImageLoadError::Io { .. }));
    }
}
