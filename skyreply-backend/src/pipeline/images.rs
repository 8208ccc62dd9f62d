//! Reply image handling: download, fit inside 1000x1000, re-encode as JPEG,
//! enforce the blob size ceiling, upload.

use crate::bluesky::types::{AspectRatio, EmbeddedImage, ImagesEmbed, IMAGES_EMBED_TYPE};
use crate::bluesky::{FeedError, FeedService, Session};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Largest processed image we will upload (bytes)
pub const MAX_IMAGE_SIZE: usize = 10_000_000;

/// Largest source image we will download (bytes)
pub const MAX_DOWNLOAD_SIZE: usize = 25_000_000;

/// Bounding box for the processed image
pub const MAX_IMAGE_DIMENSION: u32 = 1000;

pub const IMAGE_ENCODING: &str = "image/jpeg";

pub const DEFAULT_ALT_TEXT: &str = "Default response image";

const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image download failed: {0}")]
    Download(String),
    #[error("image decode failed: {0}")]
    Decode(String),
    #[error("image encode failed: {0}")]
    Encode(String),
    #[error("image is {size} bytes, limit is {max}")]
    TooLarge { size: usize, max: usize },
    #[error("image upload failed: {0}")]
    Upload(FeedError),
}

/// Where image bytes come from
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError>;
}

/// Downloads images over HTTP, refusing bodies over `max_bytes`
pub struct HttpImageSource {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpImageSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            max_bytes: MAX_DOWNLOAD_SIZE,
        }
    }

    #[cfg(test)]
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ImageError::Download(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::Download(format!("{} returned {}", url, status)));
        }

        if let Some(declared) = response.content_length() {
            if declared > self.max_bytes as u64 {
                return Err(ImageError::TooLarge {
                    size: usize::try_from(declared).unwrap_or(usize::MAX),
                    max: self.max_bytes,
                });
            }
        }

        // Capped while streaming, with or without Content-Length
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ImageError::Download(e.to_string()))?
        {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(ImageError::TooLarge {
                    size: body.len() + chunk.len(),
                    max: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

/// Re-encoded image ready for upload
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decode, shrink to fit `MAX_IMAGE_DIMENSION` (never enlarge), encode JPEG.
pub fn transcode(raw: &[u8]) -> Result<ProcessedImage, ImageError> {
    let decoded = image::load_from_memory(raw).map_err(|e| ImageError::Decode(e.to_string()))?;

    let fitted = if decoded.width() > MAX_IMAGE_DIMENSION || decoded.height() > MAX_IMAGE_DIMENSION {
        decoded.resize(MAX_IMAGE_DIMENSION, MAX_IMAGE_DIMENSION, FilterType::Lanczos3)
    } else {
        decoded
    };

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(fitted.to_rgb8());
    let mut bytes = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY))
        .map_err(|e| ImageError::Encode(e.to_string()))?;

    Ok(ProcessedImage {
        bytes,
        width: rgb.width(),
        height: rgb.height(),
    })
}

/// Uploaded image, ready to attach to a post
#[derive(Debug, Clone)]
pub struct ImageEmbed {
    pub encoding: String,
    pub size: usize,
    pub width: u32,
    pub height: u32,
    pub alt: String,
    pub blob: Value,
}

impl ImageEmbed {
    pub fn to_embed(&self) -> ImagesEmbed {
        ImagesEmbed {
            kind: IMAGES_EMBED_TYPE,
            images: vec![EmbeddedImage {
                alt: self.alt.clone(),
                image: self.blob.clone(),
                aspect_ratio: Some(AspectRatio {
                    width: self.width,
                    height: self.height,
                }),
            }],
        }
    }
}

pub struct ImagePipeline {
    source: Arc<dyn ImageSource>,
    feed: Arc<dyn FeedService>,
    max_bytes: usize,
}

impl ImagePipeline {
    pub fn new(source: Arc<dyn ImageSource>, feed: Arc<dyn FeedService>) -> Self {
        Self {
            source,
            feed,
            max_bytes: MAX_IMAGE_SIZE,
        }
    }

    #[cfg(test)]
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Download `url`, transcode it and upload it as a blob
    pub async fn fetch_and_upload(
        &self,
        session: &Session,
        url: &str,
    ) -> Result<ImageEmbed, ImageError> {
        let raw = self.source.fetch(url).await?;
        log::debug!("Downloaded {} bytes from {}", raw.len(), url);

        let processed = tokio::task::spawn_blocking(move || transcode(&raw))
            .await
            .map_err(|e| ImageError::Encode(format!("transcode task failed: {}", e)))??;

        let size = processed.bytes.len();
        if size > self.max_bytes {
            return Err(ImageError::TooLarge {
                size,
                max: self.max_bytes,
            });
        }

        let blob = self
            .feed
            .upload_blob(session, processed.bytes, IMAGE_ENCODING)
            .await
            .map_err(ImageError::Upload)?;

        log::info!(
            "Uploaded reply image ({}x{}, {} bytes)",
            processed.width,
            processed.height,
            size
        );

        Ok(ImageEmbed {
            encoding: IMAGE_ENCODING.to_string(),
            size,
            width: processed.width,
            height: processed.height,
            alt: DEFAULT_ALT_TEXT.to_string(),
            blob,
        })
    }
}
