use std::net::{IpAddr, SocketAddr};

const MONITOR_API_ADDR: &str = "MONITOR_API_ADDR";

const MONITOR_API_PORT: &str = "MONITOR_API_PORT";

/// Apply `MONITOR_API_ADDR` / `MONITOR_API_PORT` on top of the configured bind address
///
/// Unparseable values are ignored.
pub fn api_bind_addr(configured: SocketAddr) -> SocketAddr {
    with_overrides(
        configured,
        std::env::var(MONITOR_API_ADDR).ok().as_deref(),
        std::env::var(MONITOR_API_PORT).ok().as_deref(),
    )
}

fn with_overrides(configured: SocketAddr, addr: Option<&str>, port: Option<&str>) -> SocketAddr {
    let ip = addr
        .and_then(|addr| addr.parse::<IpAddr>().ok())
        .unwrap_or(configured.ip());
    let port = port
        .and_then(|port| port.parse::<u16>().ok())
        .unwrap_or(configured.port());

    SocketAddr::new(ip, port)
}
