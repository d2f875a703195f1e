use crate::error::{GatewayError, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Largest request body the router will accumulate.
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;
/// SSE framer buffer bound; exceeding it terminates the connection.
pub const MAX_SSE_BUFFER: usize = 5 * 1024 * 1024;
/// Cap on upstream error bodies captured for retry-delay parsing.
pub const MAX_ERROR_BODY: usize = 8 * 1024;
/// Cap on a buffered unary upstream response.
pub const MAX_RESPONSE_BODY: usize = 10 * 1024 * 1024;
/// Cap on the error excerpt forwarded to the client and log.
pub const MAX_ERROR_EXCERPT: usize = 200;

pub const TIMEOUT_STREAMING: Duration = Duration::from_secs(300);
pub const TIMEOUT_NON_STREAMING: Duration = Duration::from_secs(120);
pub const TIMEOUT_PASSTHROUGH: Duration = Duration::from_secs(120);
pub const TIMEOUT_AUTH: Duration = Duration::from_secs(10);

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);
pub const MAX_RETRIES: u32 = 3;

pub const MAX_SCHEMA_DEPTH: usize = 32;

pub const MAX_LOG_SIZE: u64 = 1024 * 1024;
pub const LOG_BACKUPS: usize = 3;

/// Routes requests whose `model` starts with `source_model` to the Gemini
/// upstream under `target_model`; everything else passes through.
#[derive(Debug, Clone)]
pub struct ModelMapping {
    pub source_model: String,
    pub target_model: String,
}

impl ModelMapping {
    pub fn matches(&self, model: &str) -> bool {
        model.starts_with(&self.source_model)
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Full URL of the Gemini-compatible endpoint.
    pub endpoint: String,
    pub api_key: String,
    /// Wrap outgoing bodies as `{model, project, user_prompt_id, request}`.
    /// Compatibility proxies require this; direct endpoints do not.
    pub wrap_requests: bool,
    pub project: Option<String>,
    /// Value of the `x-cmm-provider` header on intercepted responses.
    pub provider_tag: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub tls_cert_path: PathBuf,
    pub tls_key_path: PathBuf,
    pub mapping: ModelMapping,
    pub upstream: UpstreamConfig,
    /// Real hostname the passthrough client connects to (SNI + Host).
    pub anthropic_host: String,
    /// Explicit pinned IPv4 for the Anthropic backend; bypasses resolution.
    pub anthropic_ip: Option<String>,
    pub ip_cache_path: PathBuf,
    pub log_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let listen_addr = env::var("CMM_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:443".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| GatewayError::Config(format!("Invalid listen address: {}", e)))?;

        let tls_cert_path = env::var("CMM_TLS_CERT")
            .map(PathBuf::from)
            .map_err(|_| GatewayError::Config("CMM_TLS_CERT is not set".to_string()))?;
        let tls_key_path = env::var("CMM_TLS_KEY")
            .map(PathBuf::from)
            .map_err(|_| GatewayError::Config("CMM_TLS_KEY is not set".to_string()))?;

        let mapping = ModelMapping {
            source_model: env::var("CMM_SOURCE_MODEL")
                .unwrap_or_else(|_| "claude-haiku-4-5".to_string()),
            target_model: env::var("CMM_TARGET_MODEL")
                .unwrap_or_else(|_| "gemini-3-pro-preview".to_string()),
        };

        let endpoint = env::var("CMM_GEMINI_ENDPOINT")
            .map_err(|_| GatewayError::Config("CMM_GEMINI_ENDPOINT is not set".to_string()))?;
        let api_key = env::var("CMM_GEMINI_API_KEY")
            .map_err(|_| GatewayError::Config("CMM_GEMINI_API_KEY is not set".to_string()))?;

        let project = env::var("CMM_GEMINI_PROJECT").ok();
        let wrap_requests = env::var("CMM_WRAP_REQUESTS")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or_else(|| project.is_some());

        let provider_tag = env::var("CMM_PROVIDER_TAG").unwrap_or_else(|_| "gemini".to_string());

        let anthropic_host =
            env::var("CMM_ANTHROPIC_HOST").unwrap_or_else(|_| "api.anthropic.com".to_string());
        let anthropic_ip = env::var("CMM_ANTHROPIC_IP").ok();

        let ip_cache_path = env::var("CMM_IP_CACHE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".cmm-upstream-ip"));
        let log_path = env::var("CMM_LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("cmm-gateway.log"));

        Ok(Config {
            listen_addr,
            tls_cert_path,
            tls_key_path,
            mapping,
            upstream: UpstreamConfig {
                endpoint,
                api_key,
                wrap_requests,
                project,
                provider_tag,
            },
            anthropic_host,
            anthropic_ip,
            ip_cache_path,
            log_path,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.upstream.endpoint.is_empty() {
            return Err(GatewayError::Config("Upstream endpoint is empty".into()));
        }
        if !self.upstream.endpoint.starts_with("https://")
            && !self.upstream.endpoint.starts_with("http://")
        {
            return Err(GatewayError::Config(format!(
                "Upstream endpoint must be a URL: {}",
                self.upstream.endpoint
            )));
        }
        if self.upstream.api_key.is_empty() {
            return Err(GatewayError::Config("Upstream API key is empty".into()));
        }
        if self.mapping.source_model.is_empty() {
            return Err(GatewayError::Config("Source model prefix is empty".into()));
        }
        if self.mapping.target_model.is_empty() {
            return Err(GatewayError::Config("Target model is empty".into()));
        }
        if self.anthropic_host.is_empty() {
            return Err(GatewayError::Config("Anthropic hostname is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config() -> Config {
        Config {
            listen_addr: "127.0.0.1:443".parse().unwrap(),
            tls_cert_path: PathBuf::from("cert.pem"),
            tls_key_path: PathBuf::from("key.pem"),
            mapping: ModelMapping {
                source_model: "claude-haiku-4-5".to_string(),
                target_model: "gemini-3-pro-preview".to_string(),
            },
            upstream: UpstreamConfig {
                endpoint: "https://proxy.example.com/v1/generate".to_string(),
                api_key: "test-key".to_string(),
                wrap_requests: false,
                project: None,
                provider_tag: "gemini".to_string(),
            },
            anthropic_host: "api.anthropic.com".to_string(),
            anthropic_ip: None,
            ip_cache_path: PathBuf::from(".cmm-upstream-ip"),
            log_path: PathBuf::from("cmm-gateway.log"),
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(make_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_key() {
        let mut config = make_config();
        config.upstream.api_key = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bare_host_endpoint() {
        let mut config = make_config();
        config.upstream.endpoint = "proxy.example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mapping_is_prefix_only() {
        let mapping = ModelMapping {
            source_model: "claude-haiku-4-5".to_string(),
            target_model: "gemini-3-pro-preview".to_string(),
        };
        assert!(mapping.matches("claude-haiku-4-5"));
        assert!(mapping.matches("claude-haiku-4-5-20251001"));
        assert!(!mapping.matches("claude-opus-4"));
        assert!(!mapping.matches(""));
    }
}
