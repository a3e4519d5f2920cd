use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::{sse, ChatTurn, DeltaStream, FunctionGateway, RemoteFunction};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::chat::AiModel;

const SYSTEM_PROMPT: &str = "You are a friendly nutrition advisor inside a diet-tracking app. \
    Give practical, concise advice about food, calories and healthy habits.";
const VALID_FOOD_PROMPT: &str =
    "Does this image show food or a drink someone could eat? Answer with YES or NO only.";
const CALORIES_PROMPT: &str = "Estimate the total calories of the food in this image. \
    Reply with a single whole number of kilocalories.";
const MEAL_NAME_PROMPT: &str =
    "Give a short, descriptive name (at most five words) for the meal in this image. \
    Reply with the name only.";

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<RequestMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct RequestMessage {
    role: String,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImagePayload {
    image_url: String,
}

#[derive(Debug, Deserialize)]
struct ResponsePayload {
    messages: Vec<ChatTurn>,
    #[serde(default)]
    model: AiModel,
}

/// Gateway backed by an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct OpenAiGateway {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    vision_model: String,
    timeout: Duration,
}

impl OpenAiGateway {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            vision_model: config.openai_vision_model.clone(),
            timeout: config.ai_timeout(),
        })
    }

    fn request(&self, body: &CompletionRequest<'_>) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
    }

    async fn complete(&self, body: CompletionRequest<'_>) -> AppResult<String> {
        let response = self
            .request(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("AI request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!("AI provider returned {status}: {text}")));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Malformed AI response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::Upstream("AI response had no content".into()))
    }

    async fn ask_about_image(
        &self,
        prompt: &str,
        payload: Value,
        max_tokens: u32,
    ) -> AppResult<String> {
        let ImagePayload { image_url } = serde_json::from_value(payload)
            .map_err(|e| AppError::Validation(format!("imageUrl required: {e}")))?;

        let messages = vec![RequestMessage {
            role: "user".into(),
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: prompt.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: image_url },
                },
            ]),
        }];

        self.complete(CompletionRequest {
            model: &self.vision_model,
            messages,
            max_tokens,
            stream: false,
        })
        .await
    }
}

fn conversation(turns: Vec<ChatTurn>) -> Vec<RequestMessage> {
    std::iter::once(RequestMessage {
        role: "system".into(),
        content: MessageContent::Text(SYSTEM_PROMPT.into()),
    })
    .chain(turns.into_iter().map(|t| RequestMessage {
        role: t.role.as_str().into(),
        content: MessageContent::Text(t.content),
    }))
    .collect()
}

/// A YES/NO answer counts as YES only when it starts with "yes".
fn is_affirmative(answer: &str) -> bool {
    answer
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .to_ascii_lowercase()
        .starts_with("yes")
}

#[async_trait]
impl FunctionGateway for OpenAiGateway {
    async fn call(&self, function: RemoteFunction, payload: Value) -> AppResult<Value> {
        tracing::debug!(function = %function, "Calling remote function");

        match function {
            RemoteFunction::GenerateResponse => {
                let ResponsePayload { messages, model } = serde_json::from_value(payload)
                    .map_err(|e| AppError::Validation(format!("Invalid message payload: {e}")))?;
                let content = self
                    .complete(CompletionRequest {
                        model: model.as_str(),
                        messages: conversation(messages),
                        max_tokens: 1024,
                        stream: false,
                    })
                    .await?;
                Ok(json!({ "role": "assistant", "content": content }))
            }
            RemoteFunction::ValidFoodItem => {
                let answer = self.ask_about_image(VALID_FOOD_PROMPT, payload, 5).await?;
                Ok(json!({ "valid": is_affirmative(&answer) }))
            }
            RemoteFunction::GenerateCalories => {
                let answer = self.ask_about_image(CALORIES_PROMPT, payload, 20).await?;
                Ok(json!({ "calories": answer }))
            }
            RemoteFunction::GenerateMealName => {
                let answer = self.ask_about_image(MEAL_NAME_PROMPT, payload, 20).await?;
                Ok(json!({ "mealName": answer.trim().trim_matches('"') }))
            }
        }
    }

    async fn stream_response(
        &self,
        messages: Vec<ChatTurn>,
        model: AiModel,
    ) -> AppResult<DeltaStream> {
        let body = CompletionRequest {
            model: model.as_str(),
            messages: conversation(messages),
            max_tokens: 1024,
            stream: true,
        };

        // No total timeout here: the session bounds each delta instead.
        let response = self
            .request(&body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("AI stream request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!("AI provider returned {status}: {text}")));
        }

        Ok(sse::delta_stream(response.bytes_stream()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    #[test]
    fn test_is_affirmative() {
        assert!(is_affirmative("YES"));
        assert!(is_affirmative("Yes."));
        assert!(is_affirmative("  \"yes\""));
        assert!(!is_affirmative("NO"));
        assert!(!is_affirmative("I think yes"));
        assert!(!is_affirmative(""));
    }

    #[test]
    fn test_vision_request_shape() {
        let body = CompletionRequest {
            model: "gpt-4o",
            messages: vec![RequestMessage {
                role: "user".into(),
                content: MessageContent::Parts(vec![
                    ContentPart::Text { text: "hi".into() },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: "http://x/y.jpg".into(),
                        },
                    },
                ]),
            }],
            max_tokens: 5,
            stream: false,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert!(v.get("stream").is_none());
        assert_eq!(v["messages"][0]["content"][0]["type"], "text");
        assert_eq!(v["messages"][0]["content"][1]["type"], "image_url");
        assert_eq!(v["messages"][0]["content"][1]["image_url"]["url"], "http://x/y.jpg");
    }

    #[test]
    fn test_conversation_prepends_system_prompt() {
        let msgs = conversation(vec![ChatTurn {
            role: Role::User,
            content: "How many calories in an apple?".into(),
        }]);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, "system");
        assert_eq!(msgs[1].role, "user");
    }

    #[tokio::test]
    async fn test_image_functions_require_image_url() {
        let gateway = OpenAiGateway::new(&Config::for_tests()).unwrap();
        let err = gateway
            .call(RemoteFunction::ValidFoodItem, json!({ "url": "nope" }))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
