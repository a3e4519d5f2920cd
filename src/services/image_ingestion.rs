//! Photo preparation and upload.

use anyhow::{anyhow, Context};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::storage::ObjectStore;

/// Side length of the thumbnails sent for classification.
pub const THUMBNAIL_SIDE: u32 = 112;
/// Largest encoded thumbnail we are willing to upload.
pub const MAX_UPLOAD_BYTES: usize = 15 * 1024 * 1024;
/// Quality used for every stored upload.
pub const UPLOAD_QUALITY: u8 = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub key: String,
    pub url: String,
}

/// Resizes to a 112×112 JPEG, lowering quality from 100 in steps of 10 until
/// the encoding fits. `None` when the bytes do not decode or nothing fits.
pub fn downsize_image(bytes: &[u8]) -> Option<Vec<u8>> {
    downsize_within(bytes, MAX_UPLOAD_BYTES)
}

fn downsize_within(bytes: &[u8], ceiling: usize) -> Option<Vec<u8>> {
    let image = match image::load_from_memory(bytes) {
        Ok(image) => image,
        Err(e) => {
            tracing::warn!(error = %e, "Could not decode photo");
            return None;
        }
    };
    let thumbnail = image.resize_exact(THUMBNAIL_SIDE, THUMBNAIL_SIDE, FilterType::Triangle);

    for step in (0..=10u8).rev() {
        // the encoder accepts 1..=100
        let quality = (step * 10).max(1);
        match encode_jpeg(&thumbnail, quality) {
            Ok(encoded) if encoded.len() < ceiling => return Some(encoded),
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, quality, "JPEG encoding failed");
                return None;
            }
        }
    }
    None
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> anyhow::Result<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ColorType::Rgb8,
    )?;
    Ok(out)
}

/// Uploads photos to object storage under random keys.
#[derive(Clone)]
pub struct ImageIngestion {
    store: Arc<dyn ObjectStore>,
}

impl ImageIngestion {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Downsizes off the async runtime.
    pub async fn downsize(&self, bytes: Bytes) -> AppResult<Vec<u8>> {
        tokio::task::spawn_blocking(move || downsize_image(&bytes))
            .await
            .context("downsize task panicked")?
            .ok_or_else(|| AppError::Validation("Photo could not be processed".into()))
    }

    /// Re-encodes at the upload quality and stores under `<folder>/<uuid>.jpg`.
    pub async fn upload_image(&self, bytes: Bytes, folder: &str) -> AppResult<UploadedImage> {
        let encoded = tokio::task::spawn_blocking(move || {
            let image = image::load_from_memory(&bytes)
                .map_err(|e| AppError::Validation(format!("Unsupported image: {e}")))?;
            encode_jpeg(&image, UPLOAD_QUALITY).map_err(AppError::Internal)
        })
        .await
        .map_err(|e| anyhow!("upload encode task panicked: {e}"))??;

        let key = format!("{}/{}.jpg", folder, Uuid::new_v4());
        self.store
            .put(&key, Bytes::from(encoded), "image/jpeg")
            .await?;

        let url = self.store.public_url(&key);
        tracing::debug!(key = %key, "Photo uploaded");
        Ok(UploadedImage { key, url })
    }

    pub async fn delete(&self, key: &str) -> AppResult<()> {
        self.store.delete(key).await
    }
}
