//! Blob storage for uploaded photos.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::AppResult;

mod local;
#[cfg(test)]
pub mod memory;

pub use local::LocalObjectStore;

pub const PROFILE_IMAGES_FOLDER: &str = "profile_images";
pub const FOOD_ITEM_FOLDER: &str = "foodItem";
pub const VERIFICATION_FOLDER: &str = "verification";

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> AppResult<()>;

    /// Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> AppResult<()>;

    fn public_url(&self, key: &str) -> String;
}
