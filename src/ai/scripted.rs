use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{ChatTurn, DeltaStream, FunctionGateway, RemoteFunction};
use crate::error::{AppError, AppResult};
use crate::models::chat::AiModel;

/// Gateway double that replays canned replies and records every call.
#[derive(Clone, Default)]
pub struct ScriptedGateway {
    replies: HashMap<RemoteFunction, Value>,
    deltas: Vec<String>,
    delta_delay: Option<Duration>,
    calls: Arc<Mutex<Vec<(RemoteFunction, Value)>>>,
    streams: Arc<Mutex<Vec<(Vec<ChatTurn>, AiModel)>>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(mut self, function: RemoteFunction, reply: Value) -> Self {
        self.replies.insert(function, reply);
        self
    }

    pub fn with_deltas<I, S>(mut self, deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deltas = deltas.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_delta_delay(mut self, delay: Duration) -> Self {
        self.delta_delay = Some(delay);
        self
    }

    pub async fn calls(&self) -> Vec<(RemoteFunction, Value)> {
        self.calls.lock().await.clone()
    }

    pub async fn streams(&self) -> Vec<(Vec<ChatTurn>, AiModel)> {
        self.streams.lock().await.clone()
    }
}

#[async_trait]
impl FunctionGateway for ScriptedGateway {
    async fn call(&self, function: RemoteFunction, payload: Value) -> AppResult<Value> {
        self.calls.lock().await.push((function, payload));
        self.replies
            .get(&function)
            .cloned()
            .ok_or_else(|| AppError::Upstream(format!("no scripted reply for {function}")))
    }

    async fn stream_response(
        &self,
        messages: Vec<ChatTurn>,
        model: AiModel,
    ) -> AppResult<DeltaStream> {
        self.streams.lock().await.push((messages, model));
        let deltas = self.deltas.clone();
        let delay = self.delta_delay;
        Ok(Box::pin(async_stream::stream! {
            for delta in deltas {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok::<_, AppError>(delta);
            }
        }))
    }
}
