use super::base::{Provider, TokenStream};
use super::configs::OllamaProviderConfig;
use crate::models::message::Message;
use anyhow::{anyhow, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const OLLAMA_HOST: &str = "http://localhost:11434";

pub struct OllamaProvider {
    client: Client,
    config: OllamaProviderConfig,
}

/// One line of the NDJSON response from /api/chat
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    content: String,
}

impl OllamaProvider {
    pub fn new(config: OllamaProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn parse_line(line: &str) -> Result<ChatChunk> {
        let chunk: ChatChunk = serde_json::from_str(line)?;
        if let Some(error) = chunk.error {
            return Err(anyhow!("Backend error: {}", error));
        }
        Ok(chunk)
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn stream(&self, model: &str, messages: &[Message]) -> Result<TokenStream> {
        let url = format!("{}/api/chat", self.config.host.trim_end_matches('/'));

        let payload = json!({
            "model": model,
            "messages": messages,
            "stream": true,
        });

        let response = self.client.post(&url).json(&payload).send().await?;

        match response.status() {
            StatusCode::OK => {}
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                return Err(anyhow!("Server error: {}", status));
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(anyhow!("Request failed: {}\n{}", status, body));
            }
        }

        let mut body = response.bytes_stream();

        let stream = try_stream! {
            // A transport chunk can end mid-line, so carry the tail over
            let mut carry = String::new();

            'read: while let Some(bytes) = body.next().await {
                let bytes = bytes.map_err(anyhow::Error::from)?;
                carry.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(pos) = carry.find('\n') {
                    let line: String = carry.drain(..=pos).collect();
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    let chunk = Self::parse_line(line)?;
                    if let Some(message) = chunk.message {
                        if !message.content.is_empty() {
                            yield message.content;
                        }
                    }
                    if chunk.done {
                        break 'read;
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const NDJSON: &str = "application/x-ndjson";

    async fn setup_mock_server(body: &str) -> (MockServer, OllamaProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, NDJSON))
            .mount(&mock_server)
            .await;

        let config = OllamaProviderConfig {
            host: mock_server.uri(),
        };
        let provider = OllamaProvider::new(config).unwrap();
        (mock_server, provider)
    }

    #[tokio::test]
    async fn test_stream_basic() -> Result<()> {
        let body = concat!(
            "{\"model\":\"llama3.2:1b\",\"message\":{\"role\":\"assistant\",\"content\":\"Hello\"},\"done\":false}\n",
            "{\"model\":\"llama3.2:1b\",\"message\":{\"role\":\"assistant\",\"content\":\" world\"},\"done\":false}\n",
            "{\"model\":\"llama3.2:1b\",\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
        );
        let (_server, provider) = setup_mock_server(body).await;

        let messages = vec![Message::user("Hello?")];
        let stream = provider.stream("llama3.2:1b", &messages).await?;

        let chunks: Vec<String> = stream
            .map(|chunk| chunk.unwrap())
            .collect::<Vec<_>>()
            .await;

        assert_eq!(chunks, vec!["Hello", " world"]);
        assert_eq!(chunks.concat(), "Hello world");

        Ok(())
    }

    #[tokio::test]
    async fn test_stream_forwards_model_and_messages() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "llama3.2:1b",
                "messages": [{"role": "user", "content": "Hello"}],
                "stream": true,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "{\"message\":{\"role\":\"assistant\",\"content\":\"Hi\"},\"done\":true}\n",
                NDJSON,
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = OllamaProvider::new(OllamaProviderConfig {
            host: mock_server.uri(),
        })?;

        let messages = vec![Message::user("Hello")];
        let stream = provider.stream("llama3.2:1b", &messages).await?;
        let chunks: Vec<String> = stream
            .map(|chunk| chunk.unwrap())
            .collect::<Vec<_>>()
            .await;

        assert_eq!(chunks, vec!["Hi"]);

        Ok(())
    }

    #[tokio::test]
    async fn test_server_error() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let provider = OllamaProvider::new(OllamaProviderConfig {
            host: mock_server.uri(),
        })?;

        let messages = vec![Message::user("Hello?")];
        let result = provider.stream("llama3.2:1b", &messages).await;

        assert!(result.is_err());
        assert!(result
            .err()
            .unwrap()
            .to_string()
            .contains("Server error: 500"));

        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_model_request_failure() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_raw("{\"error\":\"model 'missing' not found\"}", "application/json"),
            )
            .mount(&mock_server)
            .await;

        let provider = OllamaProvider::new(OllamaProviderConfig {
            host: mock_server.uri(),
        })?;

        let messages = vec![Message::user("Hello?")];
        let result = provider.stream("missing", &messages).await;

        assert!(result.is_err());
        let error = result.err().unwrap().to_string();
        assert!(error.contains("Request failed: 404"));
        assert!(error.contains("model 'missing' not found"));

        Ok(())
    }

    #[tokio::test]
    async fn test_error_line_ends_stream() -> Result<()> {
        let body = concat!(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"partial\"},\"done\":false}\n",
            "{\"error\":\"unexpected EOF\"}\n",
        );
        let (_server, provider) = setup_mock_server(body).await;

        let messages = vec![Message::user("Hello?")];
        let mut stream = provider.stream("llama3.2:1b", &messages).await?;

        let first = stream.next().await.unwrap();
        assert_eq!(first.unwrap(), "partial");

        let second = stream.next().await.unwrap();
        assert!(second
            .unwrap_err()
            .to_string()
            .contains("unexpected EOF"));

        Ok(())
    }
}
