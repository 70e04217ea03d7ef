use super::{ChatChunk, ChatRequest, Provider};
use crate::credential::ApiKey;
use anyhow::anyhow;
use futures_core::stream::BoxStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Clone)]
enum Step {
    Fragment(String),
    Fail(String),
}

/// In-process provider that drips a scripted fragment sequence.
///
/// With no script it echoes the request (the `--provider stub` offline mode);
/// tests script exact fragments and injected failures, and can check whether
/// a call reached the provider at all.
#[derive(Debug, Default, Clone)]
pub struct StubProvider {
    steps: Vec<Step>,
    calls: Arc<AtomicUsize>,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond with exactly these fragments, then complete.
    pub fn with_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            steps: fragments
                .into_iter()
                .map(|f| Step::Fragment(f.into()))
                .collect(),
            calls: Arc::default(),
        }
    }

    /// Yield the given fragments, then fail the stream with `error`.
    pub fn failing_after<I, S>(fragments: I, error: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut stub = Self::with_fragments(fragments);
        stub.steps.push(Step::Fail(error.to_string()));
        stub
    }

    /// How many times `stream_chat` has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Provider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn stream_chat(
        &self,
        _key: &ApiKey,
        req: ChatRequest,
    ) -> std::pin::Pin<
        Box<
            dyn std::future::Future<
                    Output = anyhow::Result<BoxStream<'static, anyhow::Result<ChatChunk>>>,
                > + Send,
        >,
    > {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let scripted = !self.steps.is_empty();
        let steps = if scripted {
            self.steps.clone()
        } else {
            vec![
                Step::Fragment(format!("[stub provider] model: {}\n\n", req.model)),
                Step::Fragment("You said: ".to_string()),
                Step::Fragment(req.message.clone()),
            ]
        };

        Box::pin(async move {
            let (tx, rx) = mpsc::channel::<anyhow::Result<ChatChunk>>(32);

            tokio::spawn(async move {
                for step in steps {
                    // The echo mode drips so streaming is visible.
                    if !scripted {
                        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
                    }
                    match step {
                        Step::Fragment(text) => {
                            if tx.send(Ok(ChatChunk { text })).await.is_err() {
                                break;
                            }
                        }
                        Step::Fail(msg) => {
                            let _ = tx.send(Err(anyhow!(msg))).await;
                            break;
                        }
                    }
                }
            });

            let stream = ReceiverStream::new(rx);
            Ok(Box::pin(stream) as BoxStream<'static, anyhow::Result<ChatChunk>>)
        })
    }
}
