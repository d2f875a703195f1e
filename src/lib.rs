//! # cmm-gateway
//!
//! A transparent TLS interception gateway that sits between an unmodified
//! Anthropic Messages client and the real Anthropic endpoint.
//!
//! ## Overview
//!
//! The gateway terminates TLS for `api.anthropic.com` on the loopback
//! interface and decides the fate of every `POST /v1/messages` by a prefix
//! match on the request's `model` field:
//!
//! - **Intercept** — translate the Claude-format request into a Gemini
//!   `generateContent` request, forward it to the configured Gemini-compatible
//!   upstream, and translate the response (streaming or unary) back into the
//!   Claude wire format the client expects.
//! - **Passthrough** — relay the request byte-for-byte over HTTPS to the real
//!   Anthropic backend at a pinned IPv4, with SNI and Host preserved.
//!
//! ## Modules
//!
//! - [`config`] - Configuration loading and tunable constants
//! - [`error`] - Error types and the client-facing error taxonomy
//! - [`models`] - Data structures for the Claude and Gemini APIs
//! - [`translate`] - Request/response transformation logic
//! - [`streaming`] - SSE framer and streaming event translator
//! - [`upstream`] - Gemini and Anthropic upstream clients
//! - [`router`] - Request classification and dispatch
//! - [`server`] - TLS listener and graceful shutdown

pub mod config;
pub mod error;
pub mod ids;
pub mod logger;
pub mod models;
pub mod router;
pub mod server;
pub mod streaming;
pub mod translate;
pub mod upstream;

pub use config::Config;
pub use error::{GatewayError, Result};
