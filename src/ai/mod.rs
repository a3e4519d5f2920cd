//! Remote AI functions.
//!
//! Callers name a function and hand over a JSON payload; the gateway decides
//! how that maps onto a model provider.

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::pin::Pin;

use crate::error::AppResult;
use crate::models::chat::{AiModel, Role};

mod openai;
#[cfg(test)]
pub mod scripted;
pub mod sse;

pub use openai::OpenAiGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteFunction {
    /// `{messages, model}` -> `{role, content}`
    GenerateResponse,
    /// `{imageUrl}` -> `{valid}`
    ValidFoodItem,
    /// `{imageUrl}` -> `{calories}`
    GenerateCalories,
    /// `{imageUrl}` -> `{mealName}`
    GenerateMealName,
}

impl RemoteFunction {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteFunction::GenerateResponse => "generateResponse",
            RemoteFunction::ValidFoodItem => "validFoodItem",
            RemoteFunction::GenerateCalories => "generateCalories",
            RemoteFunction::GenerateMealName => "generateMealName",
        }
    }
}

impl fmt::Display for RemoteFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One transcript entry as sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

pub type DeltaStream = Pin<Box<dyn Stream<Item = AppResult<String>> + Send>>;

#[async_trait]
pub trait FunctionGateway: Send + Sync {
    async fn call(&self, function: RemoteFunction, payload: Value) -> AppResult<Value>;

    /// Assistant reply as a finite sequence of text deltas.
    async fn stream_response(&self, messages: Vec<ChatTurn>, model: AiModel)
        -> AppResult<DeltaStream>;
}
