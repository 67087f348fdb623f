//! Keep-alive gate for plain HTTP connections
//!
//! A client may send further requests on the connection after the first
//! one. Each of them is routed by its own target, so a follow-up request is
//! only passed to the open upstream when it names the same target. Anything
//! else ends the client leg, the proxy closes the connection and the client
//! reconnects, which classifies the new request from scratch.

use tracing::debug;
use tunnelgate_common::constants::MAX_HEAD_SIZE;
use tunnelgate_common::{BodyFramer, BodyFraming, RequestHead, Target};

/// Tracks request boundaries on the client-to-upstream leg
#[derive(Debug)]
pub struct RequestGate {
    target: Target,
    state: GateState,
    head: Vec<u8>,
}

#[derive(Debug)]
enum GateState {
    Body(BodyFramer),
    Head,
    Closed,
}

impl RequestGate {
    /// Gate for a connection serving `target` whose first body is framed by `framing`
    pub fn new(target: Target, framing: BodyFraming) -> Self {
        Self {
            target,
            state: body_state(BodyFramer::new(framing)),
            head: Vec::new(),
        }
    }

    /// Whether the client leg is finished
    pub fn is_closed(&self) -> bool {
        matches!(self.state, GateState::Closed)
    }

    /// Pass client bytes through, appending what may reach the upstream to `out`
    pub fn feed(&mut self, mut input: &[u8], out: &mut Vec<u8>) {
        loop {
            match &mut self.state {
                GateState::Closed => return,
                _ if input.is_empty() => return,
                GateState::Body(framer) => match framer.take(input) {
                    Ok(n) => {
                        out.extend_from_slice(&input[..n]);
                        input = &input[n..];
                        if framer.is_done() {
                            self.state = GateState::Head;
                        }
                    }
                    Err(e) => return self.close(&e.to_string()),
                },
                GateState::Head => {
                    self.head.extend_from_slice(input);
                    return self.next_request(out);
                }
            }
        }
    }

    /// Admit the buffered follow-up request once its head is complete
    fn next_request(&mut self, out: &mut Vec<u8>) {
        let head = match RequestHead::parse(&self.head) {
            Ok(Some(head)) => head,
            Ok(None) if self.head.len() <= MAX_HEAD_SIZE => return,
            Ok(None) => return self.close("request head too large"),
            Err(e) => return self.close(&e.to_string()),
        };

        let framing = match self.admit(&head) {
            Ok(framing) => framing,
            Err(reason) => return self.close(&reason),
        };

        let rest = self.head.split_off(head.head_len);
        out.append(&mut self.head);
        self.state = body_state(BodyFramer::new(framing));
        self.feed(&rest, out);
    }

    fn admit(&self, head: &RequestHead) -> Result<BodyFraming, String> {
        if head.head_len > MAX_HEAD_SIZE {
            return Err("request head too large".to_string());
        }
        if head.is_connect() {
            return Err("CONNECT on a plain connection".to_string());
        }
        let target = head.resolve_target().map_err(|e| e.to_string())?;
        if target != self.target {
            return Err(format!("next request targets {}", target));
        }
        head.body_framing().map_err(|e| e.to_string())
    }

    fn close(&mut self, reason: &str) {
        debug!("Closing connection to {}: {}", self.target, reason);
        self.state = GateState::Closed;
        self.head.clear();
    }
}

fn body_state(framer: BodyFramer) -> GateState {
    if framer.is_done() {
        GateState::Head
    } else {
        GateState::Body(framer)
    }
}
