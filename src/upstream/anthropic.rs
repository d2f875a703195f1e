use crate::config::{MAX_RESPONSE_BODY, TIMEOUT_PASSTHROUGH};
use crate::error::{GatewayError, Result};
use crate::logger::LOG;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, Method, Response, StatusCode};
use bytes::Bytes;
use futures::TryStreamExt;
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Error substring the Anthropic backend returns when a thinking block's
/// signature fails verification; triggers the one-shot stripped retry.
const SIGNATURE_REJECTED: &str = "Invalid `signature` in `thinking` block";

/// Hop-by-hop request headers never copied upstream.
const SKIPPED_REQUEST_HEADERS: &[&str] = &["host", "connection", "transfer-encoding", "content-length"];

/// Hop-by-hop response headers never copied back to the client.
const SKIPPED_RESPONSE_HEADERS: &[&str] = &["connection", "transfer-encoding", "keep-alive"];

/// Byte-level relay to the real Anthropic backend at a pinned IPv4.
///
/// The TCP peer is the cached address while TLS SNI and the Host header
/// stay on the real hostname, sidestepping the hosts-file hijack that
/// points the hostname at this gateway.
pub struct AnthropicPassthrough {
    http: reqwest::Client,
    host: String,
}

impl AnthropicPassthrough {
    pub fn new(host: impl Into<String>, ip: Ipv4Addr) -> Result<Self> {
        let host = host.into();
        let http = reqwest::Client::builder()
            .resolve(&host, SocketAddr::new(IpAddr::V4(ip), 443))
            .timeout(TIMEOUT_PASSTHROUGH)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                GatewayError::Internal(format!("Failed to create passthrough client: {}", e))
            })?;
        Ok(Self { http, host })
    }

    /// Forward a request verbatim and relay the response.
    ///
    /// When `retry_body` is provided and the backend answers 400 over a
    /// rejected thinking signature, the same request is reissued exactly
    /// once with the transformed body; otherwise the buffered 400 is
    /// forwarded untouched.
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
        retry_body: Option<Box<dyn FnOnce() -> Bytes + Send>>,
    ) -> Result<Response<Body>> {
        let url = format!("https://{}{}", self.host, path_and_query);

        let response = self
            .http
            .request(method.clone(), &url)
            .headers(filter_request_headers(headers))
            .body(body)
            .send()
            .await
            .map_err(map_send_error)?;

        if response.status() == StatusCode::BAD_REQUEST {
            if let Some(retry_body) = retry_body {
                return self.handle_bad_request(method, &url, headers, response, retry_body).await;
            }
        }

        relay(response)
    }

    async fn handle_bad_request(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        response: reqwest::Response,
        retry_body: Box<dyn FnOnce() -> Bytes + Send>,
    ) -> Result<Response<Body>> {
        let status = response.status();
        let response_headers = response.headers().clone();
        let bytes = buffer_response(response).await?;

        let text = decompress_body(
            &bytes,
            response_headers
                .get(axum::http::header::CONTENT_ENCODING)
                .and_then(|v| v.to_str().ok()),
        );

        if !text.contains(SIGNATURE_REJECTED) {
            // Not the signature failure; forward the buffered 400 as-is,
            // raw bytes, original encoding.
            return buffered_response(status, &response_headers, bytes);
        }

        LOG.info("Upstream rejected thinking signature, retrying without thinking blocks");
        let retry = self
            .http
            .request(method, url)
            .headers(filter_request_headers(headers))
            .body(retry_body())
            .send()
            .await
            .map_err(map_send_error)?;
        relay(retry)
    }
}

fn map_send_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout(format!("passthrough request: {}", e))
    } else {
        GatewayError::Upstream(format!("passthrough request failed: {}", e))
    }
}

/// Stream-pipe an upstream response to the client; backpressure is the
/// pull on the body stream, and dropping it aborts the upstream request.
fn relay(response: reqwest::Response) -> Result<Response<Body>> {
    let mut builder = Response::builder().status(response.status());
    for (name, value) in response.headers() {
        if is_skipped_response_header(name) {
            continue;
        }
        builder = builder.header(name, value);
    }

    let stream = response
        .bytes_stream()
        .map_err(|e| std::io::Error::other(e.to_string()));
    builder
        .body(Body::from_stream(stream))
        .map_err(|e| GatewayError::Internal(e.to_string()))
}

fn buffered_response(
    status: StatusCode,
    headers: &HeaderMap,
    bytes: Bytes,
) -> Result<Response<Body>> {
    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        if is_skipped_response_header(name) {
            continue;
        }
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(bytes))
        .map_err(|e| GatewayError::Internal(e.to_string()))
}

async fn buffer_response(response: reqwest::Response) -> Result<Bytes> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| GatewayError::Upstream(format!("failed to read upstream body: {}", e)))?;
    if bytes.len() > MAX_RESPONSE_BODY {
        return Err(GatewayError::Upstream(format!(
            "upstream response too large: {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn filter_request_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();
    for (name, value) in headers {
        if SKIPPED_REQUEST_HEADERS.contains(&name.as_str()) {
            continue;
        }
        filtered.insert(name.clone(), value.clone());
    }
    filtered
}

fn is_skipped_response_header(name: &HeaderName) -> bool {
    SKIPPED_RESPONSE_HEADERS.contains(&name.as_str())
}

/// Decode an error body for inspection. Unknown or broken encodings fall
/// back to the raw bytes; this text is only scanned, never forwarded.
fn decompress_body(bytes: &[u8], encoding: Option<&str>) -> String {
    let encoding = encoding.unwrap_or("identity").trim().to_ascii_lowercase();

    let decoded = match encoding.as_str() {
        "gzip" | "x-gzip" => {
            let mut out = Vec::new();
            flate2::read::GzDecoder::new(bytes)
                .read_to_end(&mut out)
                .map(|_| out)
                .ok()
        }
        "deflate" => {
            let mut out = Vec::new();
            flate2::read::ZlibDecoder::new(bytes)
                .read_to_end(&mut out)
                .map(|_| out)
                .ok()
        }
        "br" => {
            let mut out = Vec::new();
            brotli::Decompressor::new(bytes, 4096)
                .read_to_end(&mut out)
                .map(|_| out)
                .ok()
        }
        _ => None,
    };

    match decoded {
        Some(out) => String::from_utf8_lossy(&out).into_owned(),
        None => String::from_utf8_lossy(bytes).into_owned(),
    }
}
