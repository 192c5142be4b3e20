// claude integration - streams coaching replies for the chat endpoint

use futures_util::StreamExt;
use reqwest_eventsource::{Error as SseError, Event, EventSource};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::Error;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const MAX_MESSAGE_CHARS: usize = 2000;
// older turns are dropped to bound memory and upstream cost
pub const MAX_HISTORY_TURNS: usize = 10;

const API_BASE: &str = "https://api.anthropic.com";

const SYSTEM_PROMPT: &str = "You are a warm, experienced meditation coach for the \
Stillmind app. Offer practical guidance on meditation technique, breathwork, stress, \
sleep, and building a daily practice. Keep answers short and conversational, and \
encourage consistency without judgment. You are not a medical professional; for \
medical or mental health concerns, gently suggest speaking to one.";

#[derive(Clone)]
pub struct Claude {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

// one prior turn of the conversation, as the app sends it
#[derive(Debug, Clone, Deserialize)]
pub struct ChatTurn {
    pub content: String,
    #[serde(rename = "isUser")]
    pub is_user: bool,
}

// a piece of the reply as it arrives, or the reason it stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatChunk {
    Text(String),
    Error(String),
}

// what we send to claude
#[derive(Serialize)]
struct Request<'a> {
    model: &'a str,
    max_tokens: u32,
    stream: bool,
    system: &'a str,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

// one frame of the upstream event stream
#[derive(Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<Delta>,
    #[serde(default)]
    error: Option<UpstreamError>,
}

#[derive(Deserialize)]
struct Delta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct UpstreamError {
    message: String,
}

pub fn validate_message(message: &str) -> Result<(), Error> {
    if message.is_empty() {
        return Err(Error::validation("Message is required"));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(Error::validation(
            "Message too long (max 2000 characters)",
        ));
    }
    Ok(())
}

impl Claude {
    // key from the flag if given, otherwise the usual env var names
    pub fn new(api_key: Option<String>, model: Option<String>) -> Result<Self, Error> {
        let api_key = api_key
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .or_else(|| std::env::var("CLAUDE_API_KEY").ok())
            .or_else(|| std::env::var("CLAUDE_KEY").ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or(Error::MissingApiKey)?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: API_BASE.to_string(),
        })
    }

    // tests point this at a local stub server
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    // streams reply text into tx until the upstream finishes, the upstream
    // fails, or the receiver goes away (client disconnect), in which case the
    // upstream connection is closed right away
    pub async fn stream_chat(
        &self,
        system_prompt: Option<&str>,
        history: &[ChatTurn],
        message: &str,
        tx: mpsc::Sender<ChatChunk>,
    ) -> Result<(), Error> {
        validate_message(message)?;

        let recent = &history[history.len().saturating_sub(MAX_HISTORY_TURNS)..];
        let mut messages: Vec<Message> = recent
            .iter()
            .map(|turn| Message {
                role: if turn.is_user { "user" } else { "assistant" },
                content: turn.content.clone(),
            })
            .collect();
        messages.push(Message {
            role: "user",
            content: message.to_string(),
        });

        let request = Request {
            model: &self.model,
            max_tokens: 1024,
            stream: true,
            system: system_prompt.unwrap_or(SYSTEM_PROMPT),
            messages,
        };

        let builder = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request);

        let mut es = EventSource::new(builder).map_err(|e| Error::Upstream(e.to_string()))?;

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    let frame: StreamEvent = match serde_json::from_str(&msg.data) {
                        Ok(frame) => frame,
                        // frames we don't understand are skipped, not fatal
                        Err(_) => continue,
                    };
                    match frame.kind.as_str() {
                        "content_block_delta" => {
                            let Some(text) = frame.delta.and_then(|d| d.text) else {
                                continue;
                            };
                            if text.is_empty() {
                                continue;
                            }
                            if tx.send(ChatChunk::Text(text)).await.is_err() {
                                debug!("chat receiver dropped, closing upstream");
                                es.close();
                                return Ok(());
                            }
                        }
                        "message_stop" => {
                            es.close();
                            return Ok(());
                        }
                        "error" => {
                            es.close();
                            let detail = frame
                                .error
                                .map(|e| e.message)
                                .unwrap_or_else(|| "upstream error".to_string());
                            return Err(Error::Upstream(detail));
                        }
                        _ => {}
                    }
                }
                Err(SseError::StreamEnded) => break,
                Err(SseError::InvalidStatusCode(code, response)) => {
                    es.close();
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::Upstream(format!("{code}: {body}")));
                }
                Err(e) => {
                    es.close();
                    return Err(Error::Upstream(e.to_string()));
                }
            }
        }

        Ok(())
    }
}
