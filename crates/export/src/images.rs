//! Image fetching and preparation for embedding
//!
//! Images are decoded, bounded to a maximum edge, flattened to RGB and
//! compressed for a `FlateDecode` image XObject.

use crate::errors::ExportError;
use async_trait::async_trait;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::imageops::FilterType;
use std::io::Write;
use std::time::Duration;

/// Downloads image bytes by URL
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ExportError>;
}

/// Fetcher for signed storage URLs
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ExportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ExportError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExportError::ImageFetch {
                url: url.to_string(),
                message: format!("status {}", status),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// An image ready to be written as a PDF XObject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    /// Zlib-compressed 8-bit RGB samples
    pub data: Vec<u8>,
}

impl PreparedImage {
    /// Size that fits in `max_width` x `max_height` keeping the aspect ratio
    pub fn fit(&self, max_width: f32, max_height: f32) -> (f32, f32) {
        let scale = (max_width / self.width as f32).min(max_height / self.height as f32);
        (self.width as f32 * scale, self.height as f32 * scale)
    }
}

/// Decode `bytes` and prepare them for embedding
///
/// Transparent pixels are composited over white, which is what a signature
/// pad produces on paper.
pub fn prepare_image(bytes: &[u8], max_edge: u32) -> Result<PreparedImage, ExportError> {
    let mut decoded = image::load_from_memory(bytes)?;
    if decoded.width() > max_edge || decoded.height() > max_edge {
        decoded = decoded.resize(max_edge, max_edge, FilterType::Triangle);
    }

    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as u32;
        for channel in [r, g, b] {
            let blended = (channel as u32 * alpha + 255 * (255 - alpha)) / 255;
            rgb.push(blended as u8);
        }
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&rgb)?;
    let data = encoder.finish()?;

    Ok(PreparedImage {
        width,
        height,
        data,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use std::collections::HashMap;
    use std::io::Read;
    use std::sync::Mutex;

    pub(crate) fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    /// Serves fixed bytes per URL and records what was requested
    #[derive(Default)]
    pub(crate) struct StubFetcher {
        pub images: HashMap<String, Vec<u8>>,
        pub requested: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        pub(crate) fn with(mut self, url: &str, bytes: Vec<u8>) -> Self {
            self.images.insert(url.to_string(), bytes);
            self
        }
    }

    #[async_trait]
    impl ImageFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, ExportError> {
            self.requested.lock().unwrap().push(url.to_string());
            self.images.get(url).cloned().ok_or_else(|| ExportError::ImageFetch {
                url: url.to_string(),
                message: "unreachable".to_string(),
            })
        }
    }

    #[test]
    fn test_prepare_downscales_and_flattens() {
        let prepared = prepare_image(&png(300, 150, [0, 0, 0, 0]), 100).unwrap();
        assert_eq!((prepared.width, prepared.height), (100, 50));

        let mut raw = Vec::new();
        ZlibDecoder::new(prepared.data.as_slice())
            .read_to_end(&mut raw)
            .unwrap();
        assert_eq!(raw.len(), 100 * 50 * 3);
        assert!(raw.iter().all(|b| *b == 255));
    }

    #[test]
    fn test_prepare_rejects_garbage() {
        assert!(matches!(
            prepare_image(b"<html>expired</html>", 100),
            Err(ExportError::ImageDecode(_))
        ));
    }

    #[test]
    fn test_fit_keeps_ratio() {
        let image = PreparedImage {
            width: 400,
            height: 100,
            data: vec![],
        };
        assert_eq!(image.fit(200.0, 80.0), (200.0, 50.0));
        assert_eq!(image.fit(1000.0, 20.0), (80.0, 20.0));
    }
}
