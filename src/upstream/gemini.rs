use crate::config::{
    DEFAULT_RETRY_DELAY, MAX_ERROR_BODY, MAX_ERROR_EXCERPT, MAX_RESPONSE_BODY, MAX_RETRIES,
    TIMEOUT_NON_STREAMING, TIMEOUT_STREAMING, UpstreamConfig,
};
use crate::error::{GatewayError, Result};
use crate::ids;
use crate::logger::LOG;
use crate::models::claude::MessagesRequest;
use crate::models::gemini::GeminiStreamChunk;
use crate::streaming::sse::frame;
use crate::streaming::{SseParser, StreamTranslator};
use crate::translate::{anthropic_to_gemini, gemini_response_to_anthropic};
use crate::upstream::auth::BearerAuth;
use axum::body::Body;
use axum::http::{Response, StatusCode, header};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Client for the Gemini-compatible upstream endpoint.
///
/// Owns the retry policy: 429 backoff with a parsed delay, a single forced
/// re-authorization on 401, everything else surfaced as `api_error`.
pub struct GeminiClient {
    http: reqwest::Client,
    config: UpstreamConfig,
    auth: Arc<BearerAuth>,
}

impl GeminiClient {
    pub fn new(config: UpstreamConfig, auth: Arc<BearerAuth>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http, config, auth })
    }

    /// Streaming intercept: translate, forward, and convert the upstream
    /// SSE stream into Claude wire events.
    pub async fn stream(&self, req: &MessagesRequest, target_model: &str) -> Result<Response<Body>> {
        let body = self.build_body(req, target_model)?;
        let upstream = self
            .send_with_retries(&body, target_model, TIMEOUT_STREAMING)
            .await?;

        let (tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(32);
        tokio::spawn(pump_stream(upstream, req.model.clone(), tx));

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::CONNECTION, "keep-alive")
            .header("x-cmm-provider", self.config.provider_tag.as_str())
            .body(Body::from_stream(ReceiverStream::new(rx)))
            .map_err(|e| GatewayError::Internal(e.to_string()))
    }

    /// Unary intercept: buffer the upstream response and convert it to the
    /// Claude Messages envelope.
    pub async fn unary(&self, req: &MessagesRequest, target_model: &str) -> Result<Response<Body>> {
        let body = self.build_body(req, target_model)?;
        let upstream = self
            .send_with_retries(&body, target_model, TIMEOUT_NON_STREAMING)
            .await?;

        if let Some(len) = upstream.content_length() {
            if len as usize > MAX_RESPONSE_BODY {
                return Err(GatewayError::Upstream(format!(
                    "upstream response too large: {} bytes",
                    len
                )));
            }
        }
        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| GatewayError::Upstream(format!("failed to read upstream body: {}", e)))?;
        if bytes.len() > MAX_RESPONSE_BODY {
            return Err(GatewayError::Upstream(format!(
                "upstream response too large: {} bytes",
                bytes.len()
            )));
        }

        let value: Value = serde_json::from_slice(&bytes)?;
        let chunk: GeminiStreamChunk = serde_json::from_value(unwrap_envelope(value))?;
        if let Some(error) = &chunk.error {
            return Err(GatewayError::Upstream(format!(
                "upstream error: {}",
                error.message.as_deref().unwrap_or("unknown")
            )));
        }

        let message = gemini_response_to_anthropic(&chunk, &req.model);
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-cmm-provider", self.config.provider_tag.as_str())
            .body(Body::from(serde_json::to_vec(&message)?))
            .map_err(|e| GatewayError::Internal(e.to_string()))
    }

    fn build_body(&self, req: &MessagesRequest, target_model: &str) -> Result<Value> {
        let upstream = serde_json::to_value(anthropic_to_gemini(req))?;
        if !self.config.wrap_requests {
            return Ok(upstream);
        }
        Ok(json!({
            "model": target_model,
            "project": self.config.project,
            "user_prompt_id": ids::user_prompt_id(),
            "request": upstream,
        }))
    }

    async fn send(
        &self,
        body: &Value,
        target_model: &str,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let token = self.auth.token().await?;
        self.http
            .post(&self.config.endpoint)
            .timeout(timeout)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header("x-model", target_model)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(format!("upstream request: {}", e))
                } else {
                    GatewayError::Upstream(format!("upstream request failed: {}", e))
                }
            })
    }

    /// Issue the request, absorbing rate limits and one auth failure.
    async fn send_with_retries(
        &self,
        body: &Value,
        target_model: &str,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let mut reauthorized = false;
        let mut rate_limit_attempts: u32 = 0;

        loop {
            let response = self.send(body, target_model, timeout).await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                if rate_limit_attempts >= MAX_RETRIES {
                    LOG.error(&format!(
                        "Upstream rate limit persisted after {} retries",
                        MAX_RETRIES
                    ));
                    return Err(GatewayError::RateLimited);
                }
                let delay = retry_delay(response).await;
                rate_limit_attempts += 1;
                LOG.info(&format!(
                    "Upstream 429, retrying in {}s ({}/{})",
                    delay.as_secs(),
                    rate_limit_attempts,
                    MAX_RETRIES
                ));
                tokio::time::sleep(delay).await;
                continue;
            }

            if status == StatusCode::UNAUTHORIZED {
                if !reauthorized {
                    reauthorized = true;
                    LOG.info("Upstream 401, refreshing token and retrying once");
                    self.auth.invalidate().await;
                    continue;
                }
                return Err(GatewayError::Authentication(
                    "upstream rejected credentials after refresh".to_string(),
                ));
            }

            let excerpt = error_excerpt(response).await;
            LOG.error(&format!("Upstream error {}: {}", status, excerpt));
            return Err(GatewayError::Upstream(format!(
                "upstream returned {}: {}",
                status, excerpt
            )));
        }
    }
}

/// Relay the upstream byte stream through the framer and translator into
/// Claude SSE frames. Runs as its own task; the channel provides the
/// backpressure, and a closed channel (client gone) drops the upstream
/// response, aborting the request.
async fn pump_stream(
    upstream: reqwest::Response,
    model: String,
    tx: mpsc::Sender<std::io::Result<Bytes>>,
) {
    let mut parser = SseParser::new();
    let mut translator = StreamTranslator::new(model);
    let mut body = upstream.bytes_stream();

    while let Some(next) = body.next().await {
        let chunk = match next {
            Ok(chunk) => chunk,
            Err(e) => {
                LOG.error(&format!("Upstream stream interrupted: {}", e));
                let _ = tx.send(Ok(error_frame("upstream connection interrupted"))).await;
                return;
            }
        };

        let events = match parser.feed(&chunk) {
            Ok(events) => events,
            Err(e) => {
                LOG.error(&format!("Terminating stream: {}", e));
                let _ = tx.send(Ok(error_frame("stream overflow"))).await;
                return;
            }
        };

        for event in events {
            for out in translate_event(&mut translator, event) {
                if tx.send(Ok(Bytes::from(out))).await.is_err() {
                    tracing::debug!("Client closed, aborting upstream stream");
                    return;
                }
            }
        }
    }

    for event in parser.flush() {
        for out in translate_event(&mut translator, event) {
            if tx.send(Ok(Bytes::from(out))).await.is_err() {
                return;
            }
        }
    }
}

fn translate_event(translator: &mut StreamTranslator, event: Value) -> Vec<String> {
    match serde_json::from_value::<GeminiStreamChunk>(unwrap_envelope(event)) {
        Ok(chunk) => translator.process_chunk(&chunk),
        Err(e) => {
            tracing::debug!(error = %e, "Skipping unparseable stream event");
            Vec::new()
        }
    }
}

/// Compatibility proxies deliver chunks wrapped as `{response, traceId}`;
/// some forks omit the wrapper, so unwrap opportunistically.
fn unwrap_envelope(event: Value) -> Value {
    match event {
        Value::Object(mut obj) if obj.contains_key("response") => {
            obj.remove("response").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn error_frame(message: &str) -> Bytes {
    Bytes::from(frame(
        "error",
        &json!({
            "type": "error",
            "error": {"type": "api_error", "message": message}
        }),
    ))
}

/// Delay before the next attempt after a 429: a numeric `Retry-After`
/// header wins, then a `reset/retry after Ns` phrase in the body, then the
/// default.
async fn retry_delay(response: reqwest::Response) -> Duration {
    if let Some(secs) = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        return Duration::from_secs(secs);
    }

    let body = capped_body(response, MAX_ERROR_BODY).await;
    parse_retry_delay(&body).unwrap_or(DEFAULT_RETRY_DELAY)
}

fn parse_retry_delay(body: &str) -> Option<Duration> {
    lazy_static::lazy_static! {
        static ref RETRY_RE: regex::Regex =
            regex::Regex::new(r"(?i)(reset|retry)\s+after\s+(\d+)\s*s").unwrap();
    }
    RETRY_RE
        .captures(body)?
        .get(2)?
        .as_str()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

async fn error_excerpt(response: reqwest::Response) -> String {
    let body = capped_body(response, MAX_ERROR_BODY).await;
    body.chars().take(MAX_ERROR_EXCERPT).collect()
}

/// Read at most `cap` bytes of a response body.
async fn capped_body(response: reqwest::Response, cap: usize) -> String {
    let mut stream = response.bytes_stream();
    let mut buf: Vec<u8> = Vec::new();
    while let Some(Ok(chunk)) = stream.next().await {
        buf.extend_from_slice(&chunk);
        if buf.len() >= cap {
            buf.truncate(cap);
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
