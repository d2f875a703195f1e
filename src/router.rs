use crate::config::{Config, MAX_BODY_SIZE};
use crate::error::GatewayError;
use crate::logger::LOG;
use crate::models::claude::MessagesRequest;
use crate::translate::strip_thinking_blocks;
use crate::upstream::{AnthropicPassthrough, GeminiClient};
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, Response, header};
use axum::routing::any;
use bytes::Bytes;
use serde_json::{Value, json};
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub gemini: GeminiClient,
    pub anthropic: AnthropicPassthrough,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/messages", any(handle_messages))
        .fallback(handle_other)
        .with_state(state)
}

async fn handle_messages(State(state): State<Arc<AppState>>, req: Request) -> Response<Body> {
    let (parts, body) = req.into_parts();
    let path_and_query = path_and_query(&parts.uri);

    if parts.method != Method::POST {
        LOG.info(&format!("{} {} → PASSTHROUGH", parts.method, parts.uri));
        return read_and_forward(&state, parts.method, path_and_query, parts.headers, body, None)
            .await;
    }

    let bytes = match to_bytes(body, MAX_BODY_SIZE).await {
        Ok(bytes) => bytes,
        Err(_) => {
            LOG.error("Request body exceeded size limit");
            return error_response(&GatewayError::BodyTooLarge);
        }
    };

    let value: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(_) => {
            LOG.info("(parse error) → PASSTHROUGH");
            return forward(&state, parts.method, path_and_query, &parts.headers, bytes, None)
                .await;
        }
    };

    let model = value.get("model").and_then(Value::as_str).unwrap_or("");
    if !state.config.mapping.matches(model) {
        LOG.info(&format!("{} → PASSTHROUGH", display_model(model)));
        // The one-shot 400 retry resends the history without thinking
        // blocks; built lazily since most requests never need it.
        let original = bytes.clone();
        let retry_body: Box<dyn FnOnce() -> Bytes + Send> = Box::new(move || {
            serde_json::to_vec(&strip_thinking_blocks(&value))
                .map(Bytes::from)
                .unwrap_or(original)
        });
        return forward(
            &state,
            parts.method,
            path_and_query,
            &parts.headers,
            bytes,
            Some(retry_body),
        )
        .await;
    }

    let request: MessagesRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            LOG.error(&format!("Unparseable intercept request: {}", e));
            return error_response(&GatewayError::Upstream(
                "failed to parse messages request".to_string(),
            ));
        }
    };

    let target = &state.config.mapping.target_model;
    LOG.info(&format!(
        "INTERCEPTED {} ({} KiB, {} messages, {} tools) → {}",
        request.model,
        bytes.len() / 1024,
        request.messages.len(),
        request.tools.as_ref().map_or(0, |tools| tools.len()),
        target
    ));

    let result = if request.stream {
        state.gemini.stream(&request, target).await
    } else {
        state.gemini.unary(&request, target).await
    };
    result.unwrap_or_else(|e| {
        LOG.error(&format!("Intercept failed: {}", e));
        error_response(&e)
    })
}

async fn handle_other(State(state): State<Arc<AppState>>, req: Request) -> Response<Body> {
    let (parts, body) = req.into_parts();
    LOG.info(&format!("{} {} → PASSTHROUGH", parts.method, parts.uri));
    let path_and_query = path_and_query(&parts.uri);
    read_and_forward(&state, parts.method, path_and_query, parts.headers, body, None).await
}

async fn read_and_forward(
    state: &AppState,
    method: Method,
    path_and_query: String,
    headers: HeaderMap,
    body: Body,
    retry_body: Option<Box<dyn FnOnce() -> Bytes + Send>>,
) -> Response<Body> {
    let bytes = match to_bytes(body, MAX_BODY_SIZE).await {
        Ok(bytes) => bytes,
        Err(_) => {
            LOG.error("Request body exceeded size limit");
            return error_response(&GatewayError::BodyTooLarge);
        }
    };
    forward(state, method, path_and_query, &headers, bytes, retry_body).await
}

async fn forward(
    state: &AppState,
    method: Method,
    path_and_query: String,
    headers: &HeaderMap,
    body: Bytes,
    retry_body: Option<Box<dyn FnOnce() -> Bytes + Send>>,
) -> Response<Body> {
    state
        .anthropic
        .forward(method, &path_and_query, headers, body, retry_body)
        .await
        .unwrap_or_else(|e| {
            LOG.error(&format!("Passthrough failed: {}", e));
            error_response(&e)
        })
}

fn path_and_query(uri: &axum::http::Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

fn display_model(model: &str) -> &str {
    if model.is_empty() { "(no model)" } else { model }
}

/// The Anthropic-wire error envelope paired with the taxonomy status.
pub fn error_response(error: &GatewayError) -> Response<Body> {
    let body = json!({
        "type": "error",
        "error": {"type": error.client_type(), "message": error.to_string()}
    });

    Response::builder()
        .status(error.client_status())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}
