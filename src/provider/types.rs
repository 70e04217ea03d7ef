use futures_core::stream::BoxStream;

use crate::credential::ApiKey;
use crate::session::Turn;

/// A single completion call: the full ordered history plus the new user
/// message.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,

    /// Prior turns, oldest first.
    pub history: Vec<Turn>,

    /// The new user message; not part of `history` yet.
    pub message: String,

    /// Sent as a leading `system` wire message; never stored as a turn.
    pub system_prompt: Option<String>,

    pub temperature: f32,
}

/// One streamed text fragment of the response.
#[derive(Debug, Clone)]
pub struct ChatChunk {
    pub text: String,
}

/// Provider interface: start a streaming completion.
///
/// The credential travels with each call rather than being baked into the
/// provider, so a session can swap keys without rebuilding anything.
pub trait Provider {
    fn name(&self) -> &'static str;

    /// Start streaming a response. The stream ends when the provider signals
    /// completion; any item may be an error, after which no further items
    /// arrive.
    fn stream_chat(
        &self,
        key: &ApiKey,
        req: ChatRequest,
    ) -> std::pin::Pin<
        Box<
            dyn std::future::Future<
                    Output = anyhow::Result<BoxStream<'static, anyhow::Result<ChatChunk>>>,
                > + Send,
        >,
    >;
}
