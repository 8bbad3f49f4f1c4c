//! Per-request orchestration: embed, retrieve, prompt, generate, deliver.
//!
//! Stages run strictly in order and at most once; nothing is retried. Any
//! failure after authentication is terminal for that request only — there is
//! no response channel left to surface it on, so it is logged and dropped.

use crate::activity::Activity;
use crate::auth::{AuthProvider, AuthProviderError};
use crate::dispatch::{DispatchError, ReplyDispatcher};
use crate::llm::{CompletionBackend, Embedder};
use crate::prompt::PromptTemplate;
use crate::retrieval::VectorIndex;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("retrieval failed: {0}")]
    Retrieval(String),
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("outbound auth failed: {0}")]
    AuthProvider(#[from] AuthProviderError),
    #[error("delivery failed: {0}")]
    Delivery(#[from] DispatchError),
}

/// One shared pipeline instance serves all requests. The embedding, index,
/// and completion handles are process-wide singletons; concurrent generation
/// is bounded by a semaphore sized to the backing model's capacity, so bursts
/// queue instead of exhausting it.
pub struct Pipeline {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    completion: Arc<dyn CompletionBackend>,
    template: PromptTemplate,
    auth: AuthProvider,
    dispatcher: ReplyDispatcher,
    generate_slots: Semaphore,
    max_tokens: u32,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        completion: Arc<dyn CompletionBackend>,
        template: PromptTemplate,
        auth: AuthProvider,
        dispatcher: ReplyDispatcher,
        max_concurrency: usize,
        max_tokens: u32,
    ) -> Self {
        Self {
            embedder,
            index,
            completion,
            template,
            auth,
            dispatcher,
            generate_slots: Semaphore::new(max_concurrency.max(1)),
            max_tokens,
        }
    }

    /// Grounded answer for a question: embed, fetch the nearest context,
    /// build the prompt, generate. Used by both the bot flow and direct chat.
    pub async fn answer(&self, question: &str) -> Result<String, PipelineError> {
        self.answer_with(question, self.max_tokens).await
    }

    pub async fn answer_with(
        &self,
        question: &str,
        max_tokens: u32,
    ) -> Result<String, PipelineError> {
        let vector = self
            .embedder
            .embed(question)
            .await
            .map_err(|e| PipelineError::Retrieval(e.to_string()))?;
        let context = self
            .index
            .nearest_one(&vector)
            .await
            .map_err(|e| PipelineError::Retrieval(e.to_string()))?;
        let prompt = self.template.build(&context.text, question);
        let _slot = self
            .generate_slots
            .acquire()
            .await
            .map_err(|_| PipelineError::Generation("inference capacity closed".to_string()))?;
        self.completion
            .complete(&prompt, max_tokens)
            .await
            .map_err(|e| PipelineError::Generation(e.to_string()))
    }

    /// Full bot flow for one authenticated activity: answer, then acquire an
    /// outbound token and post the reply into the originating conversation.
    pub async fn handle(&self, activity: Activity) -> Result<(), PipelineError> {
        let answer = self.answer(&activity.text).await?;
        let token = self.auth.get_token().await?;
        self.dispatcher.send(&activity, &token, &answer).await?;
        Ok(())
    }
}
