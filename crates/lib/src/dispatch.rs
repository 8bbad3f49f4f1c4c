//! Reply delivery: posts the generated answer back into the originating
//! conversation. One-way; never part of the inbound HTTP response.

use crate::activity::Activity;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("delivery request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("conversation service error: {0}")]
    Api(String),
}

/// Posts reply activities to the conversation service named by the inbound
/// activity's serviceUrl.
#[derive(Clone)]
pub struct ReplyDispatcher {
    client: reqwest::Client,
}

impl Default for ReplyDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Reply endpoint for an activity: `{serviceUrl}/v3/conversations/{conversationId}/activities/{activityId}`.
fn delivery_url(service_url: &str, conversation_id: &str, activity_id: &str) -> String {
    format!(
        "{}/v3/conversations/{}/activities/{}",
        service_url.trim_end_matches('/'),
        conversation_id,
        activity_id
    )
}

impl ReplyDispatcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Build the reply for `activity` and post it with the bearer token.
    /// A non-2xx status is a delivery failure for this request only.
    pub async fn send(
        &self,
        activity: &Activity,
        token: &str,
        text: &str,
    ) -> Result<(), DispatchError> {
        let reply = activity.reply_with(text);
        let url = delivery_url(&activity.service_url, &activity.conversation.id, &activity.id);
        let res = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", token))
            .json(&reply)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(DispatchError::Api(format!("{} {}", status, body)));
        }
        Ok(())
    }
}
