pub mod anthropic;
pub mod auth;
pub mod gemini;
pub mod ip_cache;

pub use anthropic::AnthropicPassthrough;
pub use auth::{BearerAuth, StaticToken, TokenSource};
pub use gemini::GeminiClient;
