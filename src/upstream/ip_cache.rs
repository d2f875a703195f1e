use crate::error::{GatewayError, Result};
use std::net::Ipv4Addr;
use std::path::Path;

/// Resolve the real Anthropic IPv4, preferring in order: an explicit
/// override, the on-disk cache from a previous run, live resolution.
///
/// Loopback results are rejected everywhere: once the hosts-file hijack for
/// the hostname is in place, the system resolver hands back 127.0.0.1 and
/// the gateway would connect to itself.
pub async fn load_or_resolve(
    cache_path: &Path,
    host: &str,
    override_ip: Option<&str>,
) -> Result<Ipv4Addr> {
    if let Some(raw) = override_ip {
        let ip = raw
            .parse::<Ipv4Addr>()
            .map_err(|e| GatewayError::Config(format!("Invalid CMM_ANTHROPIC_IP {:?}: {}", raw, e)))?;
        return Ok(ip);
    }

    if let Some(ip) = read_cached(cache_path) {
        tracing::debug!(ip = %ip, "Loaded upstream IP from cache");
        return Ok(ip);
    }

    let addrs = tokio::net::lookup_host((host, 443u16))
        .await
        .map_err(|e| GatewayError::Config(format!("Failed to resolve {}: {}", host, e)))?;
    let ip = addrs
        .filter_map(|addr| match addr.ip() {
            std::net::IpAddr::V4(v4) => Some(v4),
            std::net::IpAddr::V6(_) => None,
        })
        .find(|v4| !v4.is_loopback())
        .ok_or_else(|| {
            GatewayError::Config(format!(
                "Resolver returned no usable address for {}; if the hosts-file entry is \
                 already in place, set CMM_ANTHROPIC_IP explicitly",
                host
            ))
        })?;

    persist(cache_path, ip);
    Ok(ip)
}

fn read_cached(path: &Path) -> Option<Ipv4Addr> {
    let content = std::fs::read_to_string(path).ok()?;
    let ip = content.trim().parse::<Ipv4Addr>().ok()?;
    if ip.is_loopback() { None } else { Some(ip) }
}

/// Best-effort write of the resolved IP, mode 0600.
fn persist(path: &Path, ip: Ipv4Addr) {
    if let Err(e) = std::fs::write(path, format!("{}\n", ip)) {
        tracing::warn!(error = %e, "Failed to persist upstream IP cache");
        return;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
}
