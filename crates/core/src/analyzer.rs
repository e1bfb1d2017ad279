//! Description provider adapter: one request contract over the supported
//! backend shapes.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::{
    error::ProviderError,
    parser::parse_description,
    provider::{ProviderConfig, ProviderKind},
    types::FrameDescription,
};

pub const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(60);
pub const CHAT_PROBE_TIMEOUT: Duration = Duration::from_secs(15);
pub const TAGS_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub static DEFAULT_ANALYSIS_PROMPT: &str = r#"You are an expert at writing precise prompts for image generation models (Stable Diffusion, Midjourney, DALL-E). Analyze this image and describe it so that it can be recreated.

Cover every one of these elements in detail:

1. Main subjects: every person, object or character with specifics (age, gender, appearance, clothing, pose, expression, hair, accessories)
2. Action and pose: exact actions, gestures, body language, hand positions, gaze direction
3. Composition and framing: camera angle, shot type, rule of thirds, symmetry
4. Background and setting: environment, location type, indoor or outdoor, architecture, props, depth layers
5. Lighting: type, direction, quality, shadows, highlights, color temperature
6. Color palette: dominant and secondary colors, harmony, saturation, contrast, warm or cool tones
7. Atmosphere and mood: feeling, ambiance, weather, time of day
8. Style and quality: photographic or artistic style, quality tags (photorealistic, highly detailed, 8k, sharp focus)
9. Technical details: depth of field, bokeh, focus point, textures, material properties

Rules:
- Be specific and precise, never vague
- Use professional photography and cinematography terms
- Never mention watermarks, subtitles, UI elements, logos, text overlays, timestamps or player controls
- Describe only visual elements that belong in a generated image
- Write in the comma-separated style of image generation prompts
- Include quality modifiers such as "highly detailed", "professional", "sharp focus"
- Give exact quantities ("three people", not "some people")

Provide the description in both English and Chinese. The English version must work as a direct image generation prompt.

Format your response EXACTLY as follows:
EN: [detailed English description in prompt style]
ZH: [对应的详细中文描述]"#;

/// Something that can turn an image into a bilingual description.
pub trait DescriptionProvider: Send + Sync {
    async fn analyze(
        &self,
        image: &[u8],
        config: &ProviderConfig,
    ) -> Result<FrameDescription, ProviderError>;

    /// Checks the endpoint is reachable without spending real quota.
    async fn test_connection(&self, config: &ProviderConfig) -> Result<bool, ProviderError>;
}

/// Request/response layout spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireShape {
    /// Ollama `/api/chat`: images next to the prompt, text at `message.content`.
    Ollama,
    /// OpenAI-compatible chat completions, text at `choices[0].message.content`.
    ChatCompletions,
}

impl WireShape {
    pub fn of(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Ollama => WireShape::Ollama,
            ProviderKind::Openai | ProviderKind::Lmstudio | ProviderKind::Custom => {
                WireShape::ChatCompletions
            }
        }
    }

    fn sends_auth(&self) -> bool {
        matches!(self, WireShape::ChatCompletions)
    }

    pub fn payload(&self, config: &ProviderConfig, prompt: &str, image_base64: &str) -> Value {
        match self {
            WireShape::Ollama => json!({
                "model": config.model,
                "messages": [
                    {
                        "role": "user",
                        "content": prompt,
                        "images": [image_base64],
                    }
                ],
                "stream": false,
                "options": {
                    "temperature": config.temperature,
                    "num_predict": config.max_tokens,
                },
            }),
            WireShape::ChatCompletions => json!({
                "model": config.model,
                "messages": [
                    {
                        "role": "user",
                        "content": [
                            {"type": "text", "text": prompt},
                            {
                                "type": "image_url",
                                "image_url": {
                                    "url": format!("data:image/jpeg;base64,{image_base64}"),
                                },
                            },
                        ],
                    }
                ],
                "max_tokens": config.max_tokens,
                "temperature": config.temperature,
            }),
        }
    }

    pub fn content<'a>(&self, response: &'a Value) -> Option<&'a str> {
        match self {
            WireShape::Ollama => response["message"]["content"].as_str(),
            WireShape::ChatCompletions => response["choices"][0]["message"]["content"].as_str(),
        }
    }
}

/// Maps a non-success HTTP status to its failure kind.
pub fn status_error(status: StatusCode, endpoint: &str, body: &str) -> ProviderError {
    match status.as_u16() {
        401 => ProviderError::AuthInvalid,
        403 => ProviderError::AccessDenied,
        404 => ProviderError::EndpointNotFound {
            endpoint: endpoint.to_string(),
        },
        429 => ProviderError::RateLimited,
        code if code >= 500 => ProviderError::ServerError { status: code },
        code => ProviderError::Api {
            status: code,
            message: error_message(body),
        },
    }
}

/// Best-effort error text from a JSON error body.
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v["error"]["message"]
                .as_str()
                .or_else(|| v["error"].as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "unknown error".to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        })
}

fn transport_error(error: reqwest::Error, endpoint: &str, timeout: Duration) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout {
            seconds: timeout.as_secs(),
        }
    } else if error.is_connect() {
        ProviderError::ConnectionRefused {
            endpoint: endpoint.to_string(),
        }
    } else {
        ProviderError::Network(error.to_string())
    }
}

/// Ollama's model listing lives next to the chat endpoint.
fn tags_url(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    let base = base.strip_suffix("/api/chat").unwrap_or(base);
    format!("{base}/api/tags")
}

/// HTTP implementation of [`DescriptionProvider`].
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: reqwest::Client,
    analysis_timeout: Duration,
}

impl Default for HttpProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            analysis_timeout: ANALYSIS_TIMEOUT,
        }
    }

    async fn send(
        request: RequestBuilder,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<Response, ProviderError> {
        request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, endpoint, timeout))
    }

    fn authorize(
        request: RequestBuilder,
        shape: WireShape,
        config: &ProviderConfig,
    ) -> RequestBuilder {
        match config.api_key() {
            Some(key) if shape.sends_auth() => request.bearer_auth(key),
            _ => request,
        }
    }
}

impl DescriptionProvider for HttpProvider {
    async fn analyze(
        &self,
        image: &[u8],
        config: &ProviderConfig,
    ) -> Result<FrameDescription, ProviderError> {
        let shape = WireShape::of(config.kind);
        let prompt = config.custom_prompt().unwrap_or(DEFAULT_ANALYSIS_PROMPT);
        let payload = shape.payload(config, prompt, &STANDARD.encode(image));

        debug!(
            provider = config.kind.as_str(),
            endpoint = %config.endpoint,
            model = %config.model,
            image_bytes = image.len(),
            "requesting description"
        );

        let request =
            Self::authorize(self.client.post(&config.endpoint), shape, config).json(&payload);
        let response = Self::send(request, &config.endpoint, self.analysis_timeout).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                provider = config.kind.as_str(),
                status = status.as_u16(),
                "description request rejected"
            );
            return Err(status_error(status, &config.endpoint, &body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse {
                reason: e.to_string(),
            })?;
        let content = shape
            .content(&body)
            .ok_or_else(|| ProviderError::MalformedResponse {
                reason: format!("no message content in response: {body}"),
            })?;

        Ok(parse_description(content))
    }

    async fn test_connection(&self, config: &ProviderConfig) -> Result<bool, ProviderError> {
        match WireShape::of(config.kind) {
            WireShape::Ollama => {
                let url = tags_url(&config.endpoint);
                let response = Self::send(self.client.get(&url), &url, TAGS_PROBE_TIMEOUT).await?;
                let status = response.status();
                debug!(url = %url, status = status.as_u16(), "ollama tags probe");
                if status == StatusCode::OK {
                    Ok(true)
                } else {
                    let body = response.text().await.unwrap_or_default();
                    Err(status_error(status, &url, &body))
                }
            }
            shape @ WireShape::ChatCompletions => {
                let payload = json!({
                    "model": config.model,
                    "messages": [{"role": "user", "content": "hi"}],
                    "max_tokens": 1,
                });
                let request = Self::authorize(self.client.post(&config.endpoint), shape, config)
                    .json(&payload);
                let response = Self::send(request, &config.endpoint, CHAT_PROBE_TIMEOUT).await?;
                let status = response.status();
                debug!(endpoint = %config.endpoint, status = status.as_u16(), "chat probe");

                match status.as_u16() {
                    401 | 403 | 404 | 429 | 500..=u16::MAX => {
                        let body = response.text().await.unwrap_or_default();
                        Err(status_error(status, &config.endpoint, &body))
                    }
                    code => {
                        if !status.is_success() {
                            warn!(status = code, "endpoint reachable but rejected the probe");
                        }
                        Ok(true)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        task::JoinHandle,
    };

    use super::*;

    fn config(kind: ProviderKind, endpoint: String) -> ProviderConfig {
        ProviderConfig {
            endpoint,
            model: "vision-model".to_string(),
            api_key: Some("sk-test".to_string()),
            kind,
            ..Default::default()
        }
    }

    fn request_complete(request: &[u8]) -> bool {
        let Some(header_end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let headers = String::from_utf8_lossy(&request[..header_end]);
        let content_length = headers
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        request.len() >= header_end + 4 + content_length
    }

    /// Answers a single HTTP request with a canned response and hands back
    /// the raw request text.
    async fn serve_once(
        status: u16,
        body: &'static str,
        path: &str,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 8192];
            while !request_complete(&request) {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status} Canned\r\n\
                 content-type: application/json\r\n\
                 content-length: {}\r\n\
                 connection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).into_owned()
        });

        (format!("http://{addr}{path}"), handle)
    }

    #[test]
    fn test_ollama_payload_shape() {
        let cfg = config(ProviderKind::Ollama, "http://localhost:11434/api/chat".into());
        let payload = WireShape::Ollama.payload(&cfg, "describe", "QUJD");

        assert_eq!(payload["model"], "vision-model");
        assert_eq!(payload["messages"][0]["role"], "user");
        assert_eq!(payload["messages"][0]["content"], "describe");
        assert_eq!(payload["messages"][0]["images"][0], "QUJD");
        assert_eq!(payload["stream"], false);
        assert_eq!(payload["options"]["num_predict"], 4096);
        assert!((payload["options"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_chat_payload_shape() {
        let cfg = config(ProviderKind::Openai, "https://api.example.com".into());
        let payload = WireShape::ChatCompletions.payload(&cfg, "describe", "QUJD");

        let content = &payload["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[0]["text"], "describe");
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,QUJD");
        assert_eq!(payload["max_tokens"], 4096);
        assert!(payload.get("stream").is_none());
    }

    #[test]
    fn test_every_non_ollama_kind_uses_chat_shape() {
        for kind in [ProviderKind::Openai, ProviderKind::Lmstudio, ProviderKind::Custom] {
            assert_eq!(WireShape::of(kind), WireShape::ChatCompletions);
        }
        assert_eq!(WireShape::of(ProviderKind::Ollama), WireShape::Ollama);
    }

    #[test]
    fn test_status_mapping() {
        let map = |code: u16, body: &str| {
            status_error(StatusCode::from_u16(code).unwrap(), "http://x", body)
        };
        assert!(matches!(map(401, ""), ProviderError::AuthInvalid));
        assert!(matches!(map(403, ""), ProviderError::AccessDenied));
        assert!(matches!(map(404, ""), ProviderError::EndpointNotFound { .. }));
        assert!(matches!(map(429, ""), ProviderError::RateLimited));
        assert!(matches!(map(502, ""), ProviderError::ServerError { status: 502 }));
        match map(400, r#"{"error":{"message":"bad image"}}"#) {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad image");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_tags_url() {
        assert_eq!(tags_url("http://localhost:11434/api/chat"), "http://localhost:11434/api/tags");
        assert_eq!(tags_url("http://localhost:11434/"), "http://localhost:11434/api/tags");
    }

    #[tokio::test]
    async fn test_analyze_chat_completions() {
        let (endpoint, server) = serve_once(
            200,
            r#"{"choices":[{"message":{"content":"EN: a red car\nZH: 一辆红色的汽车"}}]}"#,
            "/v1/chat/completions",
        )
        .await;

        let description = HttpProvider::new()
            .analyze(b"jpeg-bytes", &config(ProviderKind::Lmstudio, endpoint))
            .await
            .unwrap();
        assert_eq!(description.en, "a red car");
        assert_eq!(description.zh, "一辆红色的汽车");

        let request = server.await.unwrap();
        let lower = request.to_lowercase();
        assert!(lower.starts_with("post /v1/chat/completions"));
        assert!(lower.contains("authorization: bearer sk-test"));
        let data_url = format!("data:image/jpeg;base64,{}", STANDARD.encode(b"jpeg-bytes"));
        assert!(request.contains(&data_url));
    }

    #[tokio::test]
    async fn test_analyze_ollama_sends_no_auth() {
        let (endpoint, server) = serve_once(
            200,
            r#"{"message":{"role":"assistant","content":"EN: snowy peak\nZH: 雪峰"}}"#,
            "/api/chat",
        )
        .await;

        let description = HttpProvider::new()
            .analyze(b"img", &config(ProviderKind::Ollama, endpoint))
            .await
            .unwrap();
        assert_eq!(description.en, "snowy peak");

        let request = server.await.unwrap().to_lowercase();
        assert!(!request.contains("authorization:"));
        assert!(request.contains("\"num_predict\":4096"));
    }

    #[tokio::test]
    async fn test_analyze_maps_unauthorized() {
        let (endpoint, _server) =
            serve_once(401, r#"{"error":{"message":"bad key"}}"#, "/v1/chat/completions").await;
        let err = HttpProvider::new()
            .analyze(b"img", &config(ProviderKind::Openai, endpoint))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::AuthInvalid));
    }

    #[tokio::test]
    async fn test_analyze_maps_server_error() {
        let (endpoint, _server) = serve_once(503, "", "/v1/chat/completions").await;
        let err = HttpProvider::new()
            .analyze(b"img", &config(ProviderKind::Custom, endpoint))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ServerError { status: 503 }));
    }

    #[tokio::test]
    async fn test_analyze_maps_not_found() {
        let (endpoint, _server) = serve_once(404, "", "/v1/chat/completions").await;
        let err = HttpProvider::new()
            .analyze(b"img", &config(ProviderKind::Openai, endpoint.clone()))
            .await
            .unwrap_err();
        match err {
            ProviderError::EndpointNotFound { endpoint: reported } => {
                assert_eq!(reported, endpoint)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_analyze_maps_rate_limit() {
        let (endpoint, _server) = serve_once(
            429,
            r#"{"error":{"message":"quota exceeded"}}"#,
            "/v1/chat/completions",
        )
        .await;
        let err = HttpProvider::new()
            .analyze(b"img", &config(ProviderKind::Openai, endpoint))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited));
    }

    #[tokio::test]
    async fn test_analyze_times_out_on_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let provider = HttpProvider {
            client: reqwest::Client::new(),
            analysis_timeout: Duration::from_millis(200),
        };
        let err = provider
            .analyze(b"img", &config(ProviderKind::Ollama, format!("http://{addr}/api/chat")))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_analyze_rejects_missing_content() {
        let (endpoint, _server) =
            serve_once(200, r#"{"choices":[]}"#, "/v1/chat/completions").await;
        let err = HttpProvider::new()
            .analyze(b"img", &config(ProviderKind::Openai, endpoint))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_analyze_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = HttpProvider::new()
            .analyze(b"img", &config(ProviderKind::Ollama, format!("http://{addr}/api/chat")))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ConnectionRefused { .. }));
    }

    #[tokio::test]
    async fn test_connection_ollama_lists_tags() {
        let (endpoint, server) = serve_once(200, r#"{"models":[]}"#, "/api/chat").await;
        let ok = HttpProvider::new()
            .test_connection(&config(ProviderKind::Ollama, endpoint))
            .await
            .unwrap();
        assert!(ok);
        assert!(server.await.unwrap().starts_with("GET /api/tags"));
    }

    #[tokio::test]
    async fn test_connection_chat_accepts_client_errors_as_reachable() {
        let (endpoint, server) = serve_once(
            400,
            r#"{"error":"max_tokens too small"}"#,
            "/v1/chat/completions",
        )
        .await;
        let ok = HttpProvider::new()
            .test_connection(&config(ProviderKind::Openai, endpoint))
            .await
            .unwrap();
        assert!(ok);
        assert!(server.await.unwrap().contains("\"max_tokens\":1"));
    }

    #[tokio::test]
    async fn test_connection_chat_forbidden() {
        let (endpoint, _server) = serve_once(403, "", "/v1/chat/completions").await;
        let err = HttpProvider::new()
            .test_connection(&config(ProviderKind::Lmstudio, endpoint))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::AccessDenied));
    }
}
