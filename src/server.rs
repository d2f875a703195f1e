use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::logger::LOG;
use axum::Router;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use std::io;
use std::time::Duration;

/// How long graceful shutdown waits for in-flight requests to drain.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Terminate TLS on the configured loopback address and serve the router.
///
/// Runs until SIGINT/SIGTERM, then stops accepting, drains in-flight
/// requests, and returns.
pub async fn run(config: &Config, app: Router) -> Result<()> {
    let tls = RustlsConfig::from_pem_file(&config.tls_cert_path, &config.tls_key_path)
        .await
        .map_err(|e| GatewayError::Config(format!("Failed to load TLS key/certificate: {}", e)))?;

    let listener = std::net::TcpListener::bind(config.listen_addr)
        .map_err(|e| bind_error(e, config))?;
    listener.set_nonblocking(true)?;

    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone()));

    LOG.info(&format!("Listening on https://{}", config.listen_addr));

    axum_server::from_tcp_rustls(listener, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(GatewayError::Io)
}

fn bind_error(e: io::Error, config: &Config) -> GatewayError {
    match e.kind() {
        io::ErrorKind::PermissionDenied => GatewayError::Config(format!(
            "Binding {} requires root privileges",
            config.listen_addr
        )),
        io::ErrorKind::AddrInUse => GatewayError::Config(format!(
            "{} is already in use; is the gateway already running?",
            config.listen_addr
        )),
        _ => GatewayError::Io(e),
    }
}

async fn shutdown_on_signal(handle: Handle) {
    let interrupt = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }

    LOG.info("Shutting down, draining in-flight requests");
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config_on(addr: &str) -> Config {
        Config {
            listen_addr: addr.parse().unwrap(),
            tls_cert_path: PathBuf::from("cert.pem"),
            tls_key_path: PathBuf::from("key.pem"),
            mapping: crate::config::ModelMapping {
                source_model: "claude-haiku-4-5".into(),
                target_model: "gemini-3-pro-preview".into(),
            },
            upstream: crate::config::UpstreamConfig {
                endpoint: "https://example.com".into(),
                api_key: "k".into(),
                wrap_requests: false,
                project: None,
                provider_tag: "gemini".into(),
            },
            anthropic_host: "api.anthropic.com".into(),
            anthropic_ip: None,
            ip_cache_path: PathBuf::from(".ip"),
            log_path: PathBuf::from("test.log"),
        }
    }

    #[test]
    fn test_bind_error_messages() {
        let config = config_on("127.0.0.1:443");

        let denied = bind_error(io::Error::from(io::ErrorKind::PermissionDenied), &config);
        assert!(denied.to_string().contains("requires root"));

        let in_use = bind_error(io::Error::from(io::ErrorKind::AddrInUse), &config);
        assert!(in_use.to_string().contains("already in use"));
    }

    #[test]
    fn test_address_in_use_detected() {
        let first = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = first.local_addr().unwrap();
        let config = config_on(&addr.to_string());

        let second = std::net::TcpListener::bind(config.listen_addr);
        let err = bind_error(second.unwrap_err(), &config);
        assert!(err.to_string().contains("already in use"));
    }
}
