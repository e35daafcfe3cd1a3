//! Generation orchestrator and the OpenRouter chat-completions client.
//!
//! [`TextGenerator`] is the model boundary: prompt in, raw text out, no
//! schema enforced. [`Orchestrator`] drives it: one draft call per transcript
//! chunk in order, then a finishing call that asks for the structured JSON
//! object the parser consumes. Every call goes through the shared
//! [`RateLimiter`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use postforge_shared::{
    GenerationConfig, PostforgeError, Result, SourceKind, SourceMetadata, TranscriptChunk,
};
use postforge_text::truncate_to_char_boundary;

use crate::prompts::{self, DraftPart};
use crate::rate_limit::RateLimiter;

/// Bytes of a provider error body kept in error messages.
const ERROR_BODY_LIMIT: usize = 300;

/// Sampling parameters passed with every prompt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl From<&GenerationConfig> for GenerationParams {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

/// A generative text model.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}

// ---------------------------------------------------------------------------
// OpenRouter client
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenRouterClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("postforge/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PostforgeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for OpenRouterClient {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: params.temperature,
            max_tokens: params.max_output_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PostforgeError::Network(format!("generation request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_provider_error(status, &body));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| PostforgeError::Generation(format!("invalid response body: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| PostforgeError::Generation("empty response from model".into()))
    }
}

/// Map a non-success provider response onto the error taxonomy.
fn classify_provider_error(status: StatusCode, body: &str) -> PostforgeError {
    let snippet = truncate_to_char_boundary(body.trim(), ERROR_BODY_LIMIT);
    let quota = body.contains("RESOURCE_EXHAUSTED") || body.to_lowercase().contains("quota");

    if status == StatusCode::TOO_MANY_REQUESTS || quota {
        PostforgeError::RateLimited(format!("generation provider returned {status}: {snippet}"))
    } else if status.is_server_error() {
        PostforgeError::Network(format!("generation provider returned {status}: {snippet}"))
    } else {
        PostforgeError::Generation(format!("generation provider returned {status}: {snippet}"))
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// What the orchestrator knows about the source being written up.
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    pub source_id: &'a str,
    pub kind: SourceKind,
    pub metadata: &'a SourceMetadata,
}

/// Sequential, rate-limited prompting of a [`TextGenerator`].
pub struct Orchestrator {
    generator: Arc<dyn TextGenerator>,
    limiter: Arc<RateLimiter>,
    params: GenerationParams,
    chunk_delay: Duration,
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        limiter: Arc<RateLimiter>,
        config: &GenerationConfig,
    ) -> Self {
        Self {
            generator,
            limiter,
            params: GenerationParams::from(config),
            chunk_delay: Duration::from_millis(config.chunk_delay_ms),
        }
    }

    /// Produce the raw draft for a source.
    ///
    /// Topics take one call. Transcripts take one call per chunk, in chunk
    /// order with the chunk delay between calls, joined by a blank line.
    #[instrument(skip_all, fields(source_id = %context.source_id, chunks = chunks.len(), is_short = is_short))]
    pub async fn generate(
        &self,
        chunks: &[TranscriptChunk],
        context: &GenerationContext<'_>,
        is_short: bool,
    ) -> Result<String> {
        if context.kind == SourceKind::Topic {
            return self.complete(&prompts::topic_draft(context.metadata)).await;
        }

        match chunks {
            [] => Err(PostforgeError::TranscriptUnavailable(format!(
                "{}: transcript is empty",
                context.source_id
            ))),
            [only] => {
                let prompt =
                    prompts::transcript_draft(context.metadata, &only.text, DraftPart::Whole, is_short);
                self.complete(&prompt).await
            }
            _ => {
                info!(chunks = chunks.len(), "generating multi-chunk draft");
                let mut parts = Vec::with_capacity(chunks.len());
                for (i, chunk) in chunks.iter().enumerate() {
                    if i > 0 {
                        tokio::time::sleep(self.chunk_delay).await;
                    }
                    let part = DraftPart::Chunk {
                        index: chunk.index,
                        total: chunks.len(),
                    };
                    let prompt =
                        prompts::transcript_draft(context.metadata, &chunk.text, part, is_short);
                    parts.push(self.complete(&prompt).await?);
                    debug!(chunk = chunk.index, "chunk drafted");
                }
                Ok(parts.join("\n\n"))
            }
        }
    }

    /// The finishing pass: ask for the structured JSON object.
    #[instrument(skip_all, fields(source_id = %context.source_id))]
    pub async fn finish(
        &self,
        draft: &str,
        context: &GenerationContext<'_>,
        is_short: bool,
    ) -> Result<String> {
        let prompt = prompts::finishing(
            context.kind,
            context.source_id,
            context.metadata,
            draft,
            is_short,
        );
        self.complete(&prompt).await
    }

    /// One rate-limited call. A transient failure is retried once after the
    /// chunk delay; quota errors are never retried.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        self.limiter.acquire().await;
        match self.generator.generate(prompt, &self.params).await {
            Err(e) if e.is_transient() => {
                warn!(error = %e, "generation call failed, retrying once");
                tokio::time::sleep(self.chunk_delay).await;
                self.limiter.acquire().await;
                self.generator.generate(prompt, &self.params).await
            }
            other => other,
        }
    }
}
