use super::{ChatChunk, ChatRequest, Provider};
use crate::credential::ApiKey;
use anyhow::{anyhow, Context};
use futures_core::stream::BoxStream;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// Default API base; any OpenAI-compatible server works via `with_base`.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1/";

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_base: Url,
}

impl OpenAiProvider {
    pub fn new(http: reqwest::Client) -> anyhow::Result<Self> {
        Self::with_base(http, DEFAULT_API_BASE)
    }

    /// Point at an OpenAI-compatible server (local proxy, alternate vendor).
    pub fn with_base(http: reqwest::Client, base: &str) -> anyhow::Result<Self> {
        // Url::join drops the last path segment without a trailing slash.
        let mut base = base.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let api_base = Url::parse(&base).with_context(|| format!("invalid API base URL: {base}"))?;
        Ok(Self { http, api_base })
    }

    fn build_url(&self) -> anyhow::Result<Url> {
        Ok(self.api_base.join("chat/completions")?)
    }

    fn headers(key: &ApiKey) -> anyhow::Result<HeaderMap> {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut v = HeaderValue::from_str(&format!("Bearer {}", key.expose()))
            .map_err(|e| anyhow!(e).context("API key is not a valid header value"))?;
        v.set_sensitive(true);
        h.insert(AUTHORIZATION, v);
        Ok(h)
    }
}

impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

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
    > {
        let this = self.clone();
        let key = key.clone();

        Box::pin(async move {
            let url = this.build_url()?;
            let headers = Self::headers(&key)?;
            let body = ChatCompletionRequest::from_request(&req);

            let resp = this
                .http
                .post(url)
                .headers(headers)
                .json(&body)
                .send()
                .await
                .context("failed to start chat completion request")?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(anyhow!("API error: HTTP {status}: {text}"));
            }

            let (tx, rx) = mpsc::channel::<anyhow::Result<ChatChunk>>(64);

            tokio::spawn(async move {
                let mut stream = resp.bytes_stream();
                let mut parser = SseParser::new();

                while let Some(item) = stream.next().await {
                    let bytes = match item {
                        Ok(b) => b,
                        Err(e) => {
                            let _ = tx.send(Err(anyhow!(e).context("network stream error"))).await;
                            return;
                        }
                    };

                    for ev in parser.push(&bytes) {
                        match ev {
                            Ok(SseEvent::Data(data)) => {
                                let data = data.trim();
                                if data.is_empty() {
                                    continue;
                                }
                                // Completion signal; closing the channel ends
                                // the consumer-side stream.
                                if data == "[DONE]" {
                                    return;
                                }

                                match serde_json::from_str::<ChatCompletionChunk>(data) {
                                    Ok(chunk) => {
                                        if let Some(text) = extract_delta(&chunk) {
                                            if tx.send(Ok(ChatChunk { text })).await.is_err() {
                                                return;
                                            }
                                        }
                                    }
                                    Err(e) => {
                                        let _ = tx
                                            .send(Err(anyhow!(e)
                                                .context("failed to parse SSE JSON")))
                                            .await;
                                        return;
                                    }
                                }
                            }
                            Ok(SseEvent::Other) => {}
                            Err(e) => {
                                let _ = tx.send(Err(e)).await;
                                return;
                            }
                        }
                    }
                }
            });

            let out = ReceiverStream::new(rx);
            Ok(Box::pin(out) as BoxStream<'static, anyhow::Result<ChatChunk>>)
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

impl ChatCompletionRequest {
    fn from_request(req: &ChatRequest) -> Self {
        let mut messages = Vec::with_capacity(req.history.len() + 2);
        if let Some(system) = &req.system_prompt {
            messages.push(WireMessage {
                role: "system",
                content: system.clone(),
            });
        }
        for turn in &req.history {
            messages.push(WireMessage {
                role: turn.role.as_str(),
                content: turn.content.clone(),
            });
        }
        messages.push(WireMessage {
            role: "user",
            content: req.message.clone(),
        });

        Self {
            model: req.model.clone(),
            messages,
            stream: true,
            temperature: req.temperature,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

fn extract_delta(chunk: &ChatCompletionChunk) -> Option<String> {
    let choice = chunk.choices.first()?;
    choice.delta.content.clone().filter(|t| !t.is_empty())
}

#[derive(Debug, Clone)]
enum SseEvent {
    Data(String),
    Other,
}

/// Incremental SSE parser. Bytes may arrive split anywhere, including inside
/// a UTF-8 sequence mid-line; events are emitted once the blank line ending
/// them has been seen.
struct SseParser {
    buf: Vec<u8>,
    cur_data: String,
}

impl SseParser {
    fn new() -> Self {
        Self {
            buf: Vec::new(),
            cur_data: String::new(),
        }
    }

    fn push(&mut self, chunk: &[u8]) -> Vec<anyhow::Result<SseEvent>> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            if line.is_empty() {
                if !self.cur_data.is_empty() {
                    // Drop the newline appended after the last data field.
                    if self.cur_data.ends_with('\n') {
                        self.cur_data.pop();
                    }
                    out.push(Ok(SseEvent::Data(std::mem::take(&mut self.cur_data))));
                }
                continue;
            }

            let s = match std::str::from_utf8(&line) {
                Ok(s) => s,
                Err(e) => {
                    out.push(Err(anyhow!(e).context("SSE line is not valid UTF-8")));
                    continue;
                }
            };

            if let Some(rest) = s.strip_prefix("data:") {
                // One optional leading space per the SSE spec.
                let rest = rest.strip_prefix(' ').unwrap_or(rest);
                self.cur_data.push_str(rest);
                self.cur_data.push('\n');
            } else {
                // Ignore other fields: event:, id:, retry:, comments.
                out.push(Ok(SseEvent::Other));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Turn;

    fn data_events(parser: &mut SseParser, bytes: &[u8]) -> Vec<String> {
        parser
            .push(bytes)
            .into_iter()
            .filter_map(|ev| match ev {
                Ok(SseEvent::Data(d)) => Some(d),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn sse_parser_handles_chunk_boundaries() {
        let mut parser = SseParser::new();

        assert!(data_events(&mut parser, b"data: {\"a\"").is_empty());
        assert!(data_events(&mut parser, b":1}\n").is_empty());
        let events = data_events(&mut parser, b"\n");
        assert_eq!(events, vec![r#"{"a":1}"#.to_string()]);
    }

    #[test]
    fn sse_parser_accepts_both_spacing_variants() {
        let mut parser = SseParser::new();
        let events = data_events(&mut parser, b"data: one\n\ndata:two\n\n");
        assert_eq!(events, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn sse_parser_strips_carriage_returns() {
        let mut parser = SseParser::new();
        let events = data_events(&mut parser, b"data: hi\r\n\r\n");
        assert_eq!(events, vec!["hi".to_string()]);
    }

    #[test]
    fn wire_request_orders_system_history_message() {
        let req = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            history: vec![Turn::user("Hi"), Turn::assistant("Hello there")],
            message: "How are you?".to_string(),
            system_prompt: Some("Be brief.".to_string()),
            temperature: 0.0,
        };

        let wire = ChatCompletionRequest::from_request(&req);
        assert!(wire.stream);
        let roles: Vec<&str> = wire.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(wire.messages.last().unwrap().content, "How are you?");
    }

    #[test]
    fn wire_request_omits_missing_system_prompt() {
        let req = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            history: Vec::new(),
            message: "Hi".to_string(),
            system_prompt: None,
            temperature: 0.7,
        };

        let wire = ChatCompletionRequest::from_request(&req);
        assert_eq!(wire.messages.len(), 1);
        assert_eq!(wire.messages[0].role, "user");
    }

    #[test]
    fn extract_delta_reads_first_choice_content() {
        let chunk: ChatCompletionChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#).unwrap();
        assert_eq!(extract_delta(&chunk), Some("Hel".to_string()));

        let role_only: ChatCompletionChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap();
        assert_eq!(extract_delta(&role_only), None);

        let empty: ChatCompletionChunk = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(extract_delta(&empty), None);
    }
}
