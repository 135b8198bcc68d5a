//! URL helpers for talking to a campusmeet server.

/// Normalize a host string for use as a base (strips protocol prefix and
/// trailing slash).
pub fn normalize_host(host: &str) -> String {
    host.trim_start_matches("http://")
        .trim_start_matches("https://")
        .trim_end_matches('/')
        .to_string()
}

/// Check if a host is a local/development address. Local hosts are spoken
/// to over `http`/`ws`, everything else over `https`/`wss`.
pub fn is_local_address(host: &str) -> bool {
    let host_part = host.split(':').next().unwrap_or(host);
    host_part == "localhost"
        || host_part == "127.0.0.1"
        || host_part == "0.0.0.0"
        || host_part.starts_with("192.168.")
        || host_part.starts_with("10.")
}

/// Convert an HTTP/HTTPS URL to its WS/WSS counterpart. URLs without an
/// HTTP scheme are returned unchanged.
pub fn http_to_ws(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}
