use http::StatusCode;

/// Reply to a successful CONNECT: a status line and no body
pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Build a complete proxy-generated error response
///
/// The body only repeats the status line so no internal detail reaches the
/// client; the connection is always closed afterwards.
pub fn status_response(status: StatusCode) -> Vec<u8> {
    let reason = status.canonical_reason().unwrap_or("Error");
    let body = format!("{} {}\n", status.as_u16(), reason);

    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status.as_u16(),
        reason,
        body.len(),
        body
    )
    .into_bytes()
}
