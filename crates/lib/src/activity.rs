//! Channel activity payloads: the inbound message shape and reply construction.
//!
//! Inbound activities are opaque to the pipeline: fields are carried through
//! verbatim and echoed back in the reply with `from`/`recipient` swapped.

use serde::{Deserialize, Serialize};

/// A party in a conversation (user or bot).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The conversation an activity belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    pub id: String,
}

/// An activity received from the conversation service. Unknown fields are
/// ignored; known fields are never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub typ: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub service_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    pub conversation: ConversationAccount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    pub text: String,
}

/// Reply posted back into the originating conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyActivity {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    pub conversation: ConversationAccount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    pub text: String,
    pub reply_to_id: String,
    pub timestamp: String,
}

impl Activity {
    /// Build the reply for this activity: `from` and `recipient` swap roles,
    /// `replyToId` points at the inbound activity id.
    pub fn reply_with(&self, text: &str) -> ReplyActivity {
        ReplyActivity {
            typ: "message".to_string(),
            from: self.recipient.clone(),
            conversation: self.conversation.clone(),
            recipient: self.from.clone(),
            text: text.to_string(),
            reply_to_id: self.id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
