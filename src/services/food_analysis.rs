//! Food classification and calorie estimation for meal photos.

use anyhow::anyhow;
use bytes::Bytes;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};

use super::image_ingestion::ImageIngestion;
use crate::ai::{FunctionGateway, RemoteFunction};
use crate::error::{AppError, AppResult};
use crate::storage::{FOOD_ITEM_FOLDER, VERIFICATION_FOLDER};

/// First run of ASCII digits in `text`.
pub fn extract_number(text: &str) -> Option<String> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    DIGITS
        .get_or_init(|| Regex::new(r"[0-9]+").expect("valid regex"))
        .find(text)
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzedFood {
    pub food_name: String,
    pub calorie_number: i32,
    pub image_url: String,
}

#[derive(Clone)]
pub struct FoodAnalysis {
    gateway: Arc<dyn FunctionGateway>,
    images: ImageIngestion,
}

impl FoodAnalysis {
    pub fn new(gateway: Arc<dyn FunctionGateway>, images: ImageIngestion) -> Self {
        Self { gateway, images }
    }

    /// Uploads a thumbnail, calls `function` with its URL and always removes
    /// the upload afterwards.
    async fn call_with_thumbnail(
        &self,
        function: RemoteFunction,
        image: &Bytes,
    ) -> AppResult<Value> {
        let thumbnail = self.images.downsize(image.clone()).await?;
        let upload = self
            .images
            .upload_image(Bytes::from(thumbnail), VERIFICATION_FOLDER)
            .await?;

        let result = self
            .gateway
            .call(function, json!({ "imageUrl": upload.url }))
            .await;

        if let Err(e) = self.images.delete(&upload.key).await {
            tracing::warn!(key = %upload.key, error = %e, "Failed to remove verification upload");
        }
        result
    }

    pub async fn valid_food_item(&self, image: &Bytes) -> AppResult<bool> {
        let reply = self
            .call_with_thumbnail(RemoteFunction::ValidFoodItem, image)
            .await?;
        reply
            .get("valid")
            .and_then(Value::as_bool)
            .ok_or_else(|| anyhow!("validFoodItem returned an unexpected shape: {reply}").into())
    }

    /// Calorie estimate as the digits found in the model's answer.
    pub async fn generate_calories(&self, image: &Bytes) -> AppResult<Option<String>> {
        let reply = self
            .call_with_thumbnail(RemoteFunction::GenerateCalories, image)
            .await?;
        let text = reply
            .get("calories")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("generateCalories returned an unexpected shape: {reply}"))?;
        Ok(extract_number(text))
    }

    pub async fn generate_meal_name(&self, image: &Bytes) -> AppResult<String> {
        let reply = self
            .call_with_thumbnail(RemoteFunction::GenerateMealName, image)
            .await?;
        let name = reply
            .get("mealName")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("generateMealName returned an unexpected shape: {reply}"))?;
        Ok(name.to_string())
    }

    /// Classifies, then estimates calories, then names the meal, then stores
    /// the full photo. Stops at the first step that fails.
    pub async fn analyze(&self, image: Bytes) -> AppResult<AnalyzedFood> {
        if !self.valid_food_item(&image).await? {
            tracing::info!("Photo rejected by food classifier");
            return Err(AppError::InvalidFoodImage);
        }

        let calories = self
            .generate_calories(&image)
            .await?
            .ok_or_else(|| AppError::Upstream("Calorie estimate contained no number".into()))?;
        let calorie_number: i32 = calories
            .parse()
            .map_err(|_| AppError::Upstream(format!("Calorie estimate out of range: {calories}")))?;

        let food_name = self.generate_meal_name(&image).await?;
        let stored = self.images.upload_image(image, FOOD_ITEM_FOLDER).await?;

        tracing::info!(food_name = %food_name, calorie_number, "Photo analyzed");
        Ok(AnalyzedFood {
            food_name,
            calorie_number,
            image_url: stored.url,
        })
    }
}
