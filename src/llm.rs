use crate::config::{LlmConfig, LlmProvider};
use crate::error::{DashboardError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Free-text generation backend
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct LlmClient {
    provider: LlmProvider,
    api_key: Option<String>,
    base_url: String,
    model: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| DashboardError::Service(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            provider: config.provider,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout: config.timeout(),
            http,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                DashboardError::Service(format!(
                    "No API key configured (set LLM_API_KEY or {})",
                    self.provider.api_key_var()
                ))
            })
    }

    fn request(&self, prompt: &str) -> Result<reqwest::RequestBuilder> {
        let api_key = self.api_key()?;
        let request = match self.provider {
            LlmProvider::OpenAi => self
                .http
                .post(format!("{}/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", api_key))
                .json(&openai_body(&self.model, prompt)),
            LlmProvider::Gemini => self
                .http
                .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
                .header("x-goog-api-key", api_key)
                .json(&gemini_body(prompt)),
        };
        Ok(request.header("Content-Type", "application/json"))
    }

    fn transport_error(&self, err: reqwest::Error) -> DashboardError {
        if err.is_timeout() {
            DashboardError::Service(format!(
                "LLM request timed out after {}s",
                self.timeout.as_secs()
            ))
        } else {
            DashboardError::Service(format!("LLM API call failed: {}", err))
        }
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!("Calling {:?} model {} ({} prompt chars)", self.provider, self.model, prompt.len());

        let response = self
            .request(prompt)?
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DashboardError::Service(format!(
                "LLM API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| self.transport_error(e))?;

        let text = match self.provider {
            LlmProvider::OpenAi => openai_content(&response_json)?,
            LlmProvider::Gemini => gemini_text(&response_json)?,
        };
        Ok(text.trim().to_string())
    }
}

fn openai_body(model: &str, prompt: &str) -> Value {
    serde_json::json!({
        "model": model,
        "messages": [
            {"role": "user", "content": prompt}
        ],
        "temperature": 0.3,
    })
}

fn gemini_body(prompt: &str) -> Value {
    serde_json::json!({
        "contents": [
            {"parts": [{"text": prompt}]}
        ]
    })
}

fn api_error(response_json: &Value) -> Option<DashboardError> {
    response_json.get("error").map(|error| {
        DashboardError::Service(format!("LLM API error: {}", error))
    })
}

/// Extract the first choice's message content from a chat-completions response
pub(crate) fn openai_content(response_json: &Value) -> Result<String> {
    if let Some(err) = api_error(response_json) {
        return Err(err);
    }

    let choice = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| DashboardError::Service("No choices in LLM response".to_string()))?;

    match choice.get("finish_reason").and_then(|r| r.as_str()) {
        Some("length") => warn!("LLM response was truncated due to length limit"),
        Some("content_filter") => {
            return Err(DashboardError::Service(
                "LLM response was filtered by content policy".to_string(),
            ))
        }
        _ => {}
    }

    choice["message"]["content"]
        .as_str()
        .filter(|c| !c.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| DashboardError::Service("No content in LLM response".to_string()))
}

/// Concatenate the text parts of the first Gemini candidate
pub(crate) fn gemini_text(response_json: &Value) -> Result<String> {
    if let Some(err) = api_error(response_json) {
        return Err(err);
    }

    let parts = response_json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c["content"]["parts"].as_array())
        .ok_or_else(|| DashboardError::Service("No candidates in LLM response".to_string()))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.trim().is_empty() {
        return Err(DashboardError::Service("Empty text in LLM response".to_string()));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_openai_content() {
        let response = json!({
            "choices": [{"message": {"content": "  Production rose.\n"}, "finish_reason": "stop"}]
        });
        assert_eq!(openai_content(&response).unwrap(), "  Production rose.\n");
    }

    #[test]
    fn test_openai_errors() {
        assert!(openai_content(&json!({"error": {"message": "quota"}})).is_err());
        assert!(openai_content(&json!({"choices": []})).is_err());
        let filtered = json!({"choices": [{"message": {"content": "x"}, "finish_reason": "content_filter"}]});
        assert!(matches!(openai_content(&filtered), Err(DashboardError::Service(_))));
    }

    #[test]
    fn test_gemini_text_joins_parts() {
        let response = json!({
            "candidates": [{"content": {"parts": [{"text": "Catch "}, {"text": "grew."}]}}]
        });
        assert_eq!(gemini_text(&response).unwrap(), "Catch grew.");
        assert!(gemini_text(&json!({"candidates": []})).is_err());
    }

    #[tokio::test]
    async fn test_missing_api_key_is_service_error() {
        let client = LlmClient::new(&LlmConfig::for_provider(LlmProvider::OpenAi)).unwrap();
        let result = client.generate("hello").await;
        match result {
            Err(DashboardError::Service(msg)) => assert!(msg.contains("OPENAI_API_KEY")),
            other => panic!("expected service error, got {:?}", other),
        }
    }

    /// Read one HTTP request (headers plus any declared body) off the socket
    async fn read_request(socket: &mut tokio::net::TcpStream) {
        use tokio::io::AsyncReadExt;

        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + content_length {
                    return;
                }
            }
        }
    }

    fn local_config(provider: LlmProvider, addr: std::net::SocketAddr) -> LlmConfig {
        let mut config = LlmConfig::for_provider(provider);
        config.api_key = Some("test-key".to_string());
        config.base_url = format!("http://{}", addr);
        config.timeout_secs = 1;
        config
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            // Hold the connection open without answering
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let client = LlmClient::new(&local_config(LlmProvider::OpenAi, addr)).unwrap();
        match client.generate("hello").await {
            Err(DashboardError::Service(msg)) => assert!(msg.contains("timed out"), "{}", msg),
            other => panic!("expected timeout, got {:?}", other),
        }
        server.abort();
    }

    #[tokio::test]
    async fn test_error_status_is_service_error() {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            let body = "quota exhausted";
            let response = format!(
                "HTTP/1.1 500 Internal Server Error\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        let client = LlmClient::new(&local_config(LlmProvider::Gemini, addr)).unwrap();
        match client.generate("hello").await {
            Err(DashboardError::Service(msg)) => {
                assert!(msg.contains("500"), "{}", msg);
                assert!(msg.contains("quota exhausted"), "{}", msg);
            }
            other => panic!("expected status error, got {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_service_error() {
        let mut config = LlmConfig::for_provider(LlmProvider::Gemini);
        config.api_key = Some("test-key".to_string());
        config.base_url = "http://127.0.0.1:9".to_string();
        config.timeout_secs = 2;
        let client = LlmClient::new(&config).unwrap();
        assert!(matches!(
            client.generate("hello").await,
            Err(DashboardError::Service(_))
        ));
    }
}
