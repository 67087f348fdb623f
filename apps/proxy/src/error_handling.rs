//! Error responses
//!
//! Failures before the relay starts are answered with a bare status
//! response. The client only ever sees the status line; the detail is
//! logged.

use http::StatusCode;
use tunnelgate_common::{TunnelError, status_response};

/// Status code reported to the client for `err`
///
/// # Examples
///
/// ```
/// use http::StatusCode;
/// use tunnelgate_common::TunnelError;
/// use tunnelgate_proxy::error_handling::status_for;
///
/// let err = TunnelError::ConnectTimeout("hot.net.il:443".to_string());
/// assert_eq!(status_for(&err), StatusCode::GATEWAY_TIMEOUT);
/// ```
pub fn status_for(err: &TunnelError) -> StatusCode {
    match err {
        TunnelError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        TunnelError::HeadTooLarge(_) => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
        TunnelError::ConnectTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        TunnelError::Resolve { .. }
        | TunnelError::UpstreamConnect { .. }
        | TunnelError::TunnelUnavailable { .. }
        | TunnelError::PreambleRejected(_)
        | TunnelError::InvalidPreamble(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Whether `err` is the client's fault rather than an upstream failure
pub fn is_client_error(err: &TunnelError) -> bool {
    status_for(err).is_client_error()
}

/// Complete response bytes for `err`, free of internal detail
pub fn error_response(err: &TunnelError) -> Vec<u8> {
    status_response(status_for(err))
}
