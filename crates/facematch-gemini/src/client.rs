//! HTTP comparator client.

use crate::config::{ConfigError, GeminiConfig};
use crate::wire::{ApiErrorEnvelope, GenerateContentRequest, GenerateContentResponse};
use facematch_core::{parse_verdict, Comparator, ComparisonError, EncodedImage};
use std::future::Future;
use std::time::Duration;

const USER_AGENT: &str = concat!("facematch/", env!("CARGO_PKG_VERSION"));
const API_KEY_HEADER: &str = "x-goog-api-key";
// Error bodies are echoed into messages; keep them short.
const MAX_ERROR_MESSAGE: usize = 300;

/// [`Comparator`] that asks a Gemini model whether two images show the same person.
///
/// One request per comparison. No retries, caching or rate limiting: any
/// transport, API or parsing problem surfaces as a [`ComparisonError`].
pub struct GeminiComparator {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl GeminiComparator {
    /// Build a client. Fails if no API key is configured.
    pub fn new(config: &GeminiConfig) -> Result<Self, ConfigError> {
        let api_key = config.api_key()?.to_string();
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        tracing::info!(
            model = %config.model,
            endpoint = %config.endpoint,
            timeout_secs = config.timeout_secs,
            "Gemini comparator configured"
        );

        Ok(Self {
            http,
            api_key,
            model: config.model.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }

    /// Submit both images and return the model's raw answer text.
    async fn generate(
        &self,
        first: &EncodedImage,
        second: &EncodedImage,
    ) -> Result<String, ComparisonError> {
        let body = GenerateContentRequest::comparison(first, second);
        let response = self
            .http
            .post(self.url())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ComparisonError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            return Err(ComparisonError::Api {
                status: status.as_u16(),
                message: error_message(&raw),
            });
        }

        let payload: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ComparisonError::Malformed(e.to_string()))?;

        payload.text().ok_or_else(|| {
            tracing::warn!(finish_reason = ?payload.finish_reason(), "Gemini returned no answer text");
            ComparisonError::EmptyResponse
        })
    }
}

impl Comparator for GeminiComparator {
    fn compare(
        &self,
        first: &EncodedImage,
        second: &EncodedImage,
    ) -> impl Future<Output = Result<bool, ComparisonError>> + Send {
        async move {
            let answer = self.generate(first, second).await?;
            let verdict = parse_verdict(&answer);
            tracing::debug!(answer = %answer.trim(), verdict = ?verdict, "Gemini verdict");
            verdict
        }
    }
}

/// Prefer the structured `error.message`; fall back to a truncated raw body.
fn error_message(raw: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(raw) {
        if !envelope.error.message.is_empty() {
            return envelope.error.message;
        }
    }
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(MAX_ERROR_MESSAGE) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facematch_core::codec;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn config(endpoint: &str) -> GeminiConfig {
        GeminiConfig {
            api_key: Some("test-key".into()),
            endpoint: endpoint.to_string(),
            timeout_secs: 5,
            ..Default::default()
        }
    }

    fn images() -> (EncodedImage, EncodedImage) {
        (
            codec::encode(b"probe", "image/png").unwrap(),
            codec::encode(b"face", "image/jpeg").unwrap(),
        )
    }

    /// Serve one HTTP response on a loopback port; yields the raw request it received.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            let _ = tx.send(request);
        });

        (format!("http://{addr}"), rx)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + body_len {
                break;
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[test]
    fn test_new_requires_api_key() {
        let config = GeminiConfig::default();
        assert!(matches!(
            GeminiComparator::new(&config),
            Err(ConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn test_url() {
        let comparator = GeminiComparator::new(&config("https://example.test/")).unwrap();
        assert_eq!(
            comparator.url(),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(comparator.model(), "gemini-2.5-flash");
    }

    #[test]
    fn test_error_message_prefers_envelope() {
        let raw = r#"{"error":{"code":400,"message":"Image too large","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(error_message(raw), "Image too large");
        assert_eq!(error_message("  Bad Gateway \n"), "Bad Gateway");

        let long = "x".repeat(1000);
        assert_eq!(error_message(&long).len(), MAX_ERROR_MESSAGE + 3);
    }

    #[tokio::test]
    async fn test_compare_yes() {
        let (endpoint, request) = serve_once(
            "200 OK",
            r#"{"candidates":[{"content":{"parts":[{"text":"Yes\n"}],"role":"model"},"finishReason":"STOP"}]}"#,
        )
        .await;
        let comparator = GeminiComparator::new(&config(&endpoint)).unwrap();
        let (probe, face) = images();

        assert_eq!(comparator.compare(&probe, &face).await, Ok(true));

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /v1beta/models/gemini-2.5-flash:generateContent "));
        assert!(request.to_ascii_lowercase().contains("x-goog-api-key: test-key"));
        assert!(request.contains(probe.data()));
        assert!(request.contains(face.data()));
        assert!(request.contains("inlineData"));
    }

    #[tokio::test]
    async fn test_compare_no() {
        let (endpoint, _request) = serve_once(
            "200 OK",
            r#"{"candidates":[{"content":{"parts":[{"text":"No"}]}}]}"#,
        )
        .await;
        let comparator = GeminiComparator::new(&config(&endpoint)).unwrap();
        let (probe, face) = images();

        assert_eq!(comparator.compare(&probe, &face).await, Ok(false));
    }

    #[tokio::test]
    async fn test_compare_ambiguous_answer_is_error() {
        let (endpoint, _request) = serve_once(
            "200 OK",
            r#"{"candidates":[{"content":{"parts":[{"text":"Yes, these look alike."}]}}]}"#,
        )
        .await;
        let comparator = GeminiComparator::new(&config(&endpoint)).unwrap();
        let (probe, face) = images();

        assert!(matches!(
            comparator.compare(&probe, &face).await,
            Err(ComparisonError::Ambiguous(_))
        ));
    }

    #[tokio::test]
    async fn test_compare_api_error() {
        let (endpoint, _request) = serve_once(
            "403 Forbidden",
            r#"{"error":{"code":403,"message":"API key not valid.","status":"PERMISSION_DENIED"}}"#,
        )
        .await;
        let comparator = GeminiComparator::new(&config(&endpoint)).unwrap();
        let (probe, face) = images();

        assert_eq!(
            comparator.compare(&probe, &face).await,
            Err(ComparisonError::Api {
                status: 403,
                message: "API key not valid.".into()
            })
        );
    }

    #[tokio::test]
    async fn test_compare_empty_candidates() {
        let (endpoint, _request) = serve_once("200 OK", r#"{"candidates":[]}"#).await;
        let comparator = GeminiComparator::new(&config(&endpoint)).unwrap();
        let (probe, face) = images();

        assert_eq!(
            comparator.compare(&probe, &face).await,
            Err(ComparisonError::EmptyResponse)
        );
    }

    #[tokio::test]
    async fn test_compare_malformed_body() {
        let (endpoint, _request) = serve_once("200 OK", "<html>oops</html>").await;
        let comparator = GeminiComparator::new(&config(&endpoint)).unwrap();
        let (probe, face) = images();

        assert!(matches!(
            comparator.compare(&probe, &face).await,
            Err(ComparisonError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_compare_unreachable_endpoint() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let comparator = GeminiComparator::new(&config(&format!("http://{addr}"))).unwrap();
        let (probe, face) = images();

        assert!(matches!(
            comparator.compare(&probe, &face).await,
            Err(ComparisonError::Unavailable(_))
        ));
    }
}
