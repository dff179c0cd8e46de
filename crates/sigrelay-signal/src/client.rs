//! Reasoning service client.

use crate::config::LlmConfig;
use crate::error::{SignalError, SignalResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str =
    "You are a professional cryptocurrency trading analyst who extracts trade signals from chat messages.";

/// One prompt in, one reply out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> SignalResult<String>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiClient {
    config: LlmConfig,
    http: Client,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> SignalResult<Self> {
        if !config.is_configured() {
            return Err(SignalError::NotConfigured("llm.api_key is empty".to_string()));
        }
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { config, http })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl ReasoningClient for OpenAiClient {
    async fn generate(&self, prompt: &str) -> SignalResult<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        debug!(model = %self.config.model, "Sending reasoning request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, %body, "Reasoning service error");
            return Err(SignalError::Api { status, body });
        }

        let reply: ChatResponse = response.json().await?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(SignalError::EmptyReply)?;

        debug!(chars = content.len(), "Reasoning reply received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one HTTP response and hand back the raw request.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });
        (format!("http://{addr}"), handle)
    }

    fn config(base_url: String) -> LlmConfig {
        LlmConfig {
            api_key: "sk-test".to_string(),
            base_url,
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_requires_api_key() {
        assert!(matches!(
            OpenAiClient::new(LlmConfig::default()),
            Err(SignalError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_returns_first_choice() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":"{\"has_signal\":false,\"summary\":\"chat\"}"}}]}"#,
        )
        .await;
        let client = OpenAiClient::new(config(url)).unwrap();

        let reply = client.generate("hello").await.unwrap();
        assert!(reply.contains("has_signal"));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /chat/completions"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer sk-test"));
        assert!(request.contains("\"temperature\":0.3"));
        assert!(request.contains("\"max_tokens\":500"));
    }

    #[tokio::test]
    async fn test_generate_maps_api_errors() {
        let (url, _server) = serve_once("429 Too Many Requests", r#"{"error":"quota"}"#).await;
        let client = OpenAiClient::new(config(url)).unwrap();
        match client.generate("hello").await {
            Err(SignalError::Api { status, body }) => {
                assert_eq!(status, 429);
                assert!(body.contains("quota"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generate_null_content_is_empty_reply() {
        let (url, _server) =
            serve_once("200 OK", r#"{"choices":[{"message":{"content":null}}]}"#).await;
        let client = OpenAiClient::new(config(url)).unwrap();
        assert!(matches!(
            client.generate("hello").await,
            Err(SignalError::EmptyReply)
        ));
    }
}
