mod body;
mod preamble;
mod request;
mod response;

pub use body::{BodyFramer, BodyFraming};
pub use preamble::{
    PREAMBLE_PREFIX, PreambleReply, accept_preamble, encode_preamble, parse_preamble, read_line,
    request_preamble,
};
pub use request::{IncomingRequest, RequestHead, read_request_head};
pub use response::{CONNECTION_ESTABLISHED, status_response};
