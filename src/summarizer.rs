//! The summarisation collaborator.
//!
//! The pipeline asks the outside world two questions: "condense this
//! passage" and "caption this figure". [`Summarizer`] is that seam.
//! [`LlmSummarizer`] answers with an `edgequake_llm` provider; tests answer
//! with a deterministic mock.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Exponential backoff (`retry_backoff_ms * 2^attempt`)
//! spreads retries out: with 500 ms base and 2 retries the waits are
//! 500 ms → 1 s. Each attempt is bounded by `api_timeout_secs`.

use crate::config::GenerationConfig;
use crate::prompts::{caption_message, user_message, CAPTION_SYSTEM_PROMPT, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Why a single summarisation request failed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SummarizeError {
    /// The service answered with an error.
    #[error("summariser error: {0}")]
    Service(String),

    /// No answer within the per-call timeout.
    #[error("summariser timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The service answered with nothing.
    #[error("summariser returned an empty response")]
    Empty,
}

/// Condense a passage of a paper into slide-ready text.
///
/// Implementations must be `Send + Sync`: the pipeline issues several
/// requests concurrently against one instance.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, SummarizeError>;

    /// Write a one-sentence slide caption for a figure or table described
    /// by `context`. The default has no caption model and always fails,
    /// which keeps the PDF caption on the slide.
    async fn caption(&self, context: &str) -> Result<String, SummarizeError> {
        let _ = context;
        Err(SummarizeError::Empty)
    }
}

#[async_trait]
impl<T: Summarizer + ?Sized> Summarizer for Arc<T> {
    async fn summarize(&self, text: &str) -> Result<String, SummarizeError> {
        (**self).summarize(text).await
    }

    async fn caption(&self, context: &str) -> Result<String, SummarizeError> {
        (**self).caption(context).await
    }
}

/// Completion budget for a caption; one sentence never needs more.
const CAPTION_MAX_TOKENS: usize = 64;

/// [`Summarizer`] backed by an LLM provider, with timeout and retry.
pub struct LlmSummarizer {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
    caption_options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout_secs: u64,
}

impl LlmSummarizer {
    /// Wrap `provider`, taking prompt, sampling and retry knobs from `config`.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &GenerationConfig) -> Self {
        let options = build_options(config);
        let caption_options = CompletionOptions {
            max_tokens: Some(config.max_tokens.min(CAPTION_MAX_TOKENS)),
            ..options.clone()
        };
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            options,
            caption_options,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout_secs: config.api_timeout_secs,
        }
    }

    async fn attempt(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, SummarizeError> {
        let call = self.provider.chat(messages, Some(options));
        match timeout(Duration::from_secs(self.api_timeout_secs), call).await {
            Err(_) => Err(SummarizeError::Timeout {
                secs: self.api_timeout_secs,
            }),
            Ok(Err(e)) => Err(SummarizeError::Service(e.to_string())),
            Ok(Ok(response)) => {
                debug!(
                    "{} input tokens, {} output tokens",
                    response.prompt_tokens, response.completion_tokens
                );
                if response.content.trim().is_empty() {
                    Err(SummarizeError::Empty)
                } else {
                    Ok(response.content)
                }
            }
        }
    }

    /// Up to `max_retries + 1` attempts with exponential backoff. The error
    /// of the last attempt is returned.
    async fn request(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, SummarizeError> {
        let mut last_err = SummarizeError::Empty;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Summariser retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.attempt(messages, options).await {
                Ok(content) => return Ok(content),
                Err(e) => {
                    warn!("Summariser attempt {} failed: {}", attempt + 1, e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, SummarizeError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user(user_message(text)),
        ];
        let content = self.request(&messages, &self.options).await?;
        debug!("Summarised {} chars in {:?}", text.len(), start.elapsed());
        Ok(content)
    }

    async fn caption(&self, context: &str) -> Result<String, SummarizeError> {
        let messages = vec![
            ChatMessage::system(CAPTION_SYSTEM_PROMPT),
            ChatMessage::user(caption_message(context)),
        ];
        self.request(&messages, &self.caption_options).await
    }
}

/// Build `CompletionOptions` from the generation config.
fn build_options(config: &GenerationConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
