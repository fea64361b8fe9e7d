use crate::intent::Topic;
use chrono::Utc;
use serde::{ Serialize, Deserialize };
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A follow-up prompt offered under an assistant reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FollowUp {
    Single(String),
    Many(Vec<String>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Unix milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<FollowUp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now().timestamp_millis(),
            follow_up: None,
            agent: None,
        }
    }

    pub fn assistant(
        content: impl Into<String>,
        follow_up: Option<FollowUp>,
        agent: impl Into<String>
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now().timestamp_millis(),
            follow_up,
            agent: Some(agent.into()),
        }
    }
}

/// One-step memory carried between chat turns.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    pub last_intent: Option<Topic>,
    pub last_topic: Option<Topic>,
    /// Tickers seen in the conversation. Kept as metadata only; nothing reads it yet.
    #[serde(default)]
    pub mentioned_stocks: BTreeSet<String>,
    #[serde(default)]
    pub portfolio_analyzed: bool,
}

impl ConversationContext {
    pub fn record(&mut self, topic: Topic) {
        self.last_intent = Some(topic);
        self.last_topic = Some(topic);
        if topic == Topic::PortfolioAnalysis {
            self.portfolio_analyzed = true;
        }
    }
}
