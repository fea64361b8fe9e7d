use crate::models::chat::FollowUp;
use serde::{ Serialize, Deserialize };

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "chat")] Chat {
        content: String,
    },
    #[serde(rename = "clear")]
    Clear,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "response", rename_all = "camelCase")] Response {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        follow_up: Option<FollowUp>,
        agent: Option<String>,
        topic: String,
        timestamp: i64,
    },
    #[serde(rename = "error")] Error {
        message: String,
    },
    #[serde(rename = "processing")]
    Processing,
    #[serde(rename = "cleared")]
    Cleared,
}
