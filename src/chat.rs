//! Turn orchestration.
//!
//! One submission is one streamed remote call. The user turn is staged, the
//! response is assembled through the sink, and both turns are committed to
//! the conversation as a unit only after the stream completes. A failed call
//! leaves the conversation exactly as it was.

use crate::credential::{ApiKey, CredentialError};
use crate::provider::{ChatRequest, Provider};
use crate::session::{Conversation, Exchange, StreamSink, Turn};
use thiserror::Error;
use tokio_stream::StreamExt;

/// Why a submission was not completed.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The key failed the local format check; no remote call was made.
    #[error("invalid API key: {0}")]
    InvalidCredential(#[from] CredentialError),

    /// The user message was empty; no remote call was made.
    #[error("message is empty")]
    EmptyMessage,

    /// The remote call failed (network, provider rejection, malformed
    /// stream). The conversation is unchanged.
    #[error("chat request failed: {0:#}")]
    Remote(anyhow::Error),
}

/// Per-call knobs resolved from flags and config.
#[derive(Debug, Clone)]
pub struct TurnOptions {
    pub model: String,
    pub system_prompt: Option<String>,
    pub temperature: f32,
}

impl TurnOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: None,
            temperature: 0.0,
        }
    }
}

/// Run one streamed completion without touching any conversation.
///
/// Fragments go through `sink` as they arrive; the staged exchange comes
/// back only if the stream ran to completion. Callers that keep history
/// commit the exchange afterwards.
pub async fn run_turn<F: FnMut(&str)>(
    provider: &(dyn Provider + Send + Sync),
    key: &ApiKey,
    opts: &TurnOptions,
    history: &[Turn],
    user_text: &str,
    sink: &mut StreamSink<F>,
) -> Result<Exchange, SubmitError> {
    let user_text = user_text.trim();
    if user_text.is_empty() {
        return Err(SubmitError::EmptyMessage);
    }

    let req = ChatRequest {
        model: opts.model.clone(),
        history: history.to_vec(),
        message: user_text.to_string(),
        system_prompt: opts.system_prompt.clone(),
        temperature: opts.temperature,
    };

    tracing::debug!(model = %req.model, history_len = req.history.len(), "starting turn");

    let mut stream = provider
        .stream_chat(key, req)
        .await
        .map_err(SubmitError::Remote)?;

    while let Some(item) = stream.next().await {
        let chunk = item.map_err(SubmitError::Remote)?;
        sink.feed(&chunk.text);
    }

    Ok(Exchange {
        user: Turn::user(user_text),
        assistant: Turn::assistant(sink.text()),
    })
}

/// Submit one user message against a conversation.
///
/// The raw key is format-checked before anything leaves the process. On
/// success exactly two turns are appended, user then assistant; on any
/// error the conversation is untouched.
pub async fn submit<F: FnMut(&str)>(
    provider: &(dyn Provider + Send + Sync),
    raw_key: &str,
    opts: &TurnOptions,
    conversation: &mut Conversation,
    user_text: &str,
    sink: &mut StreamSink<F>,
) -> Result<(), SubmitError> {
    let key = ApiKey::parse(raw_key)?;
    let exchange = run_turn(provider, &key, opts, conversation.snapshot(), user_text, sink).await?;
    conversation.commit(exchange);
    Ok(())
}
