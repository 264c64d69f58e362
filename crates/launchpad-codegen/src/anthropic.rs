//! Anthropic Messages API generator (streaming).

use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use launchpad_core::config::GenerationConfig;
use launchpad_vcs::FileSet;

use crate::error::{GenerationError, GenerationResult};
use crate::extract::FileExtractor;
use crate::generator::{CodeGenerator, GenerationEvent, GenerationRequest};
use crate::prompt;
use crate::sse::{SseDecoder, SseEvent};

/// API version header value.
const API_VERSION: &str = "2023-06-01";

const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct AnthropicGenerator {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicGenerator {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
        }
    }

    /// `None` when no API key is configured.
    pub fn from_config(cfg: &GenerationConfig) -> Option<Self> {
        let key = cfg.api_key.as_deref().filter(|k| !k.trim().is_empty())?;
        Some(Self::new(&cfg.api_url, key, &cfg.model, cfg.max_tokens))
    }

    fn request_body(&self, request: &GenerationRequest) -> MessagesRequest {
        MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: prompt::system_prompt(request.template, &request.app),
            stream: true,
            messages: vec![Message {
                role: "user",
                content: prompt::user_message(&request.description, &request.existing),
            }],
        }
    }

    async fn stream(
        &self,
        request: GenerationRequest,
        tx: &mpsc::Sender<GenerationResult<GenerationEvent>>,
    ) -> GenerationResult<()> {
        let body = self.request_body(&request);
        info!(app = %request.app, template = %request.template, model = %self.model, "requesting generation");

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let mut bytes = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut extractor = FileExtractor::new();
        let mut files = FileSet::new();

        'stream: while let Some(chunk) = bytes.next().await {
            let chunk = chunk?;
            for event in decoder.push(&chunk) {
                let text = match classify(&event)? {
                    StreamItem::Text(text) => text,
                    StreamItem::Stop => break 'stream,
                    StreamItem::Ignore => continue,
                };
                let completed = extractor.push(&text);
                if tx.send(Ok(GenerationEvent::Token(text))).await.is_err() {
                    debug!(app = %request.app, "generation receiver dropped");
                    return Ok(());
                }
                for (name, content) in completed {
                    files.insert(name.clone(), content.clone())?;
                    if tx.send(Ok(GenerationEvent::File { name, content })).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }

        if files.is_empty() {
            warn!(app = %request.app, "model response contained no files");
            return Err(GenerationError::NoFiles);
        }
        info!(app = %request.app, files = files.len(), "generation complete");
        let _ = tx.send(Ok(GenerationEvent::Complete { files })).await;
        Ok(())
    }
}

impl CodeGenerator for AnthropicGenerator {
    fn generate(&self, request: GenerationRequest) -> mpsc::Receiver<GenerationResult<GenerationEvent>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let generator = self.clone();
        tokio::spawn(async move {
            if let Err(e) = generator.stream(request, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });
        rx
    }
}

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    stream: bool,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, PartialEq, Eq)]
enum StreamItem {
    Text(String),
    Stop,
    Ignore,
}

fn classify(event: &SseEvent) -> GenerationResult<StreamItem> {
    match event.event.as_deref() {
        Some("content_block_delta") => {
            let value: Value = serde_json::from_str(&event.data)
                .map_err(|e| GenerationError::Stream(format!("bad delta: {e}")))?;
            match value["delta"]["text"].as_str() {
                Some(text) if value["delta"]["type"] == "text_delta" => Ok(StreamItem::Text(text.to_string())),
                _ => Ok(StreamItem::Ignore),
            }
        }
        Some("message_stop") => Ok(StreamItem::Stop),
        Some("error") => {
            let message = serde_json::from_str::<Value>(&event.data)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or_else(|| event.data.clone());
            Err(GenerationError::Stream(message))
        }
        _ => Ok(StreamItem::Ignore),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchpad_core::{AppName, TemplateKind};

    fn event(name: &str, data: &str) -> SseEvent {
        SseEvent {
            event: Some(name.to_string()),
            data: data.to_string(),
        }
    }

    #[test]
    fn classifies_text_deltas() {
        let e = event(
            "content_block_delta",
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"<file"}}"#,
        );
        assert_eq!(classify(&e).unwrap(), StreamItem::Text("<file".into()));
    }

    #[test]
    fn classifies_stop_and_noise() {
        assert_eq!(classify(&event("message_stop", "{}")).unwrap(), StreamItem::Stop);
        assert_eq!(classify(&event("ping", "{}")).unwrap(), StreamItem::Ignore);
        assert_eq!(classify(&event("message_start", "{}")).unwrap(), StreamItem::Ignore);
    }

    #[test]
    fn surfaces_stream_errors() {
        let e = event(
            "error",
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        );
        match classify(&e) {
            Err(GenerationError::Stream(msg)) => assert_eq!(msg, "Overloaded"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn request_body_streams_with_system_prompt() {
        let generator = AnthropicGenerator::new("http://localhost", "k", "claude-sonnet-4-5", 8192);
        let request = GenerationRequest {
            app: AppName::parse("demo").unwrap(),
            template: TemplateKind::Api,
            description: "a todo api".into(),
            existing: FileSet::new(),
        };
        let body = serde_json::to_value(generator.request_body(&request)).unwrap();
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 8192);
        assert_eq!(body["messages"][0]["content"], "a todo api");
        assert!(body["system"].as_str().unwrap().contains("demo"));
    }

    #[test]
    fn from_config_requires_key() {
        let mut cfg = GenerationConfig::default();
        cfg.api_key = None;
        assert!(AnthropicGenerator::from_config(&cfg).is_none());
        cfg.api_key = Some("sk-test".into());
        assert!(AnthropicGenerator::from_config(&cfg).is_some());
    }
}
