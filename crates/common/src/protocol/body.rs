//! Request body framing
//!
//! The proxy never decodes bodies, it only needs to know where one request
//! ends so the next request head on the same connection can be found.

use crate::error::{Result, TunnelError};

/// How the body of a request is delimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// Exactly this many bytes follow the head (`0` when there is no body)
    Length(u64),
    /// `Transfer-Encoding: chunked`
    Chunked,
}

/// Tracks how much of a request body is still to come
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyFramer {
    state: State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Length(u64),
    Chunked(Chunk),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chunk {
    /// Reading a chunk-size line; `ext` once past the hex digits
    Size { size: u64, digits: bool, ext: bool },
    SizeLf { size: u64 },
    Data(u64),
    DataCr,
    DataLf,
    /// Start of a trailer line, or the final empty line
    TrailerStart,
    TrailerLine,
    FinalLf,
}

impl BodyFramer {
    pub fn new(framing: BodyFraming) -> Self {
        let state = match framing {
            BodyFraming::Length(0) => State::Done,
            BodyFraming::Length(n) => State::Length(n),
            BodyFraming::Chunked => State::Chunked(Chunk::Size {
                size: 0,
                digits: false,
                ext: false,
            }),
        };
        Self { state }
    }

    /// Whether the whole body has been seen
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Consume the body bytes at the start of `buf`
    ///
    /// Returns how many leading bytes belong to the body. Anything after
    /// that belongs to the next request.
    pub fn take(&mut self, buf: &[u8]) -> Result<usize> {
        match self.state {
            State::Done => Ok(0),
            State::Length(remaining) => {
                let n = remaining.min(buf.len() as u64);
                self.state = match remaining - n {
                    0 => State::Done,
                    rest => State::Length(rest),
                };
                Ok(n as usize)
            }
            State::Chunked(_) => self.take_chunked(buf),
        }
    }

    fn take_chunked(&mut self, buf: &[u8]) -> Result<usize> {
        let mut pos = 0;
        while pos < buf.len() {
            let State::Chunked(chunk) = self.state else {
                break;
            };

            if let Chunk::Data(remaining) = chunk {
                let n = remaining.min((buf.len() - pos) as u64);
                pos += n as usize;
                self.state = State::Chunked(match remaining - n {
                    0 => Chunk::DataCr,
                    rest => Chunk::Data(rest),
                });
                continue;
            }

            self.state = step(chunk, buf[pos])?;
            pos += 1;
        }
        Ok(pos)
    }
}

/// Advance the chunked decoder over one framing byte
fn step(chunk: Chunk, byte: u8) -> Result<State> {
    let next = match (chunk, byte) {
        (Chunk::Size { size, digits, .. }, b'\r') if digits => Chunk::SizeLf { size },
        (Chunk::Size { size, digits, .. }, b'\n') if digits => return Ok(after_size(size)),
        (Chunk::Size { size, ext: false, .. }, b) if b.is_ascii_hexdigit() => {
            let digit = (b as char).to_digit(16).unwrap_or(0) as u64;
            let size = size
                .checked_mul(16)
                .and_then(|s| s.checked_add(digit))
                .ok_or_else(|| malformed("chunk size overflows"))?;
            Chunk::Size {
                size,
                digits: true,
                ext: false,
            }
        }
        (Chunk::Size { size, digits: true, .. }, b';' | b' ' | b'\t') => Chunk::Size {
            size,
            digits: true,
            ext: true,
        },
        (Chunk::Size { size, ext: true, .. }, _) => Chunk::Size {
            size,
            digits: true,
            ext: true,
        },
        (Chunk::SizeLf { size }, b'\n') => return Ok(after_size(size)),
        (Chunk::DataCr, b'\r') => Chunk::DataLf,
        (Chunk::DataCr | Chunk::DataLf, b'\n') => Chunk::Size {
            size: 0,
            digits: false,
            ext: false,
        },
        (Chunk::TrailerStart, b'\r') => Chunk::FinalLf,
        (Chunk::TrailerStart | Chunk::FinalLf, b'\n') => return Ok(State::Done),
        (Chunk::TrailerStart | Chunk::TrailerLine, b'\n') => Chunk::TrailerStart,
        (Chunk::TrailerStart | Chunk::TrailerLine, _) => Chunk::TrailerLine,
        _ => return Err(malformed("invalid chunked body")),
    };
    Ok(State::Chunked(next))
}

fn after_size(size: u64) -> State {
    match size {
        0 => State::Chunked(Chunk::TrailerStart),
        n => State::Chunked(Chunk::Data(n)),
    }
}

fn malformed(reason: &str) -> TunnelError {
    TunnelError::MalformedRequest(reason.to_string())
}
