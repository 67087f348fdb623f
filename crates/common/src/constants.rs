/// Default idle interval after which a silent relay is torn down (60 seconds)
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;

/// Default bound on any outbound dial: direct target, tunnel port or bridge destination
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default local port of the proxy ingress
pub const DEFAULT_PROXY_PORT: u16 = 8000;

/// Default port of the forwarded tunnel on both hosts
pub const DEFAULT_TUNNEL_PORT: u16 = 8080;

/// Per-direction chunk size used by the relay engine
pub const RELAY_BUFFER_SIZE: usize = 8 * 1024;

/// Maximum size of a request line plus headers (64 KiB)
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Maximum number of headers accepted in a request head
pub const MAX_HEADERS: usize = 100;

/// Maximum length of a preamble or preamble reply line
pub const MAX_PREAMBLE_LEN: usize = 1024;

/// Port assumed for CONNECT authorities without an explicit port
pub const DEFAULT_CONNECT_PORT: u16 = 443;

/// Port assumed for plain HTTP targets without an explicit port
pub const DEFAULT_HTTP_PORT: u16 = 80;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_values() {
        const _: () = assert!(DEFAULT_CONNECT_TIMEOUT_SECS < DEFAULT_IDLE_TIMEOUT_SECS);
        const _: () = assert!(MAX_PREAMBLE_LEN < MAX_HEAD_SIZE);
        const _: () = assert!(RELAY_BUFFER_SIZE <= MAX_HEAD_SIZE);

        assert_eq!(MAX_HEAD_SIZE, 64 * 1024);
        assert_ne!(DEFAULT_PROXY_PORT, DEFAULT_TUNNEL_PORT);
    }
}
