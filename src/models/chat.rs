use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_CHAT_TOPIC: &str = "AI Advisor";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Models a chat can be bound to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum AiModel {
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    #[default]
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
    #[serde(rename = "gpt-4-turbo")]
    Gpt4Turbo,
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
}

impl AiModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiModel::Gpt4o => "gpt-4o",
            AiModel::Gpt4oMini => "gpt-4o-mini",
            AiModel::Gpt4Turbo => "gpt-4-turbo",
            AiModel::Gpt35Turbo => "gpt-3.5-turbo",
        }
    }
}

impl FromStr for AiModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gpt-4o" => Ok(AiModel::Gpt4o),
            "gpt-4o-mini" => Ok(AiModel::Gpt4oMini),
            "gpt-4-turbo" => Ok(AiModel::Gpt4Turbo),
            "gpt-3.5-turbo" => Ok(AiModel::Gpt35Turbo),
            other => Err(format!("unknown model: {other}")),
        }
    }
}

/// Chat row as stored. Decoded into [`AppChat`] on read.
#[derive(Debug, Clone, FromRow)]
pub struct ChatRecord {
    pub id: Uuid,
    pub owner: Uuid,
    pub topic: Option<String>,
    pub model: Option<String>,
    pub last_message_sent: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AppChat {
    pub id: Uuid,
    pub owner: Uuid,
    pub topic: Option<String>,
    pub model: Option<AiModel>,
    pub last_message_sent: DateTime<Utc>,
}

impl AppChat {
    pub fn display_topic(&self) -> &str {
        self.topic.as_deref().unwrap_or(DEFAULT_CHAT_TOPIC)
    }
}

impl TryFrom<ChatRecord> for AppChat {
    type Error = String;

    fn try_from(r: ChatRecord) -> Result<Self, Self::Error> {
        let model = r.model.as_deref().map(str::parse).transpose()?;
        Ok(Self {
            id: r.id,
            owner: r.owner,
            topic: r.topic,
            model,
            last_message_sent: r.last_message_sent,
        })
    }
}

/// Message row as stored. Decoded into [`AppMessage`] on read.
#[derive(Debug, Clone, FromRow)]
pub struct MessageRecord {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub text: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AppMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub text: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl AppMessage {
    /// A message that has not been persisted yet; its id is local until the
    /// store assigns one.
    pub fn draft(chat_id: Uuid, role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            chat_id,
            text: text.into(),
            role,
            created_at: Utc::now(),
        }
    }
}

impl TryFrom<MessageRecord> for AppMessage {
    type Error = String;

    fn try_from(r: MessageRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            chat_id: r.chat_id,
            text: r.text,
            role: r.role.parse()?,
            created_at: r.created_at,
        })
    }
}
