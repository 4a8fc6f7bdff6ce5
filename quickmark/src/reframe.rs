//! Upstream chunk re-framing into Server-Sent Events.
//!
//! The upstream streams progress as text lines that may already be SSE fields
//! (`data: {...}`) or bare JSON objects, and flush boundaries are arbitrary.
//! [`Reframer`] turns that byte stream into canonical `<line>\n\n` frames:
//!
//! - bytes are decoded incrementally; a code point split across chunks is held
//!   back until its remaining bytes arrive, invalid sequences become U+FFFD;
//! - text is split on `\r\n`, `\r` and `\n`; an unterminated tail is retained
//!   until the next chunk or the end of the stream;
//! - blank lines are dropped, SSE field lines pass through, everything else is
//!   wrapped as `data: <line>`;
//! - a line longer than [`MAX_LINE_BYTES`] is dropped whole.
//!
//! The frame sequence only depends on the concatenated bytes, never on how
//! they were chunked.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures::stream::{unfold, Stream, StreamExt};
use serde::de::IgnoredAny;
use tracing::{debug, trace, warn};

use crate::error::RelayError;

/// Line prefixes that are already valid SSE fields.
pub const SSE_FIELD_PREFIXES: [&str; 4] = ["data:", "id:", "event:", "retry:"];

/// Longest upstream line kept in memory while waiting for its line break.
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// Normalize one upstream line into a frame. Returns `None` for blank lines.
pub fn frame_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if SSE_FIELD_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) {
        return Some(format!("{}\n\n", line));
    }

    // Validity only affects tracing; JSON and plain text are wrapped alike.
    if serde_json::from_str::<IgnoredAny>(line).is_err() {
        trace!("wrapping non-JSON upstream line");
    }
    Some(format!("data: {}\n\n", line))
}

fn is_line_break(c: char) -> bool {
    c == '\r' || c == '\n'
}

fn complete_line(line: &str) -> Option<String> {
    if line.len() > MAX_LINE_BYTES {
        warn!(bytes = line.len(), "dropping overlong upstream line");
        return None;
    }
    frame_line(line)
}

/// Incremental decoder + line buffer.
#[derive(Debug, Default)]
pub struct Reframer {
    /// Bytes of an incomplete UTF-8 sequence at the end of the last chunk
    undecoded: Vec<u8>,
    /// Decoded text after the last line break
    partial: String,
    /// Skipping the rest of an overlong line
    discarding: bool,
}

impl Reframer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the frames completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.undecoded.extend_from_slice(chunk);
        let decoded = self.decode_available();
        let mut text = decoded.as_str();
        if self.discarding {
            let Some(boundary) = text.find(is_line_break) else {
                return Vec::new();
            };
            self.discarding = false;
            text = &text[boundary..];
        }
        self.partial.push_str(text);
        let frames = self.drain_complete_lines();

        if self.partial.len() > MAX_LINE_BYTES {
            warn!(bytes = self.partial.len(), "dropping overlong upstream line");
            self.partial.clear();
            self.discarding = true;
        }
        frames
    }

    /// Flush at end-of-stream: whatever is still buffered is a final line.
    pub fn finish(&mut self) -> Vec<String> {
        if !self.undecoded.is_empty() {
            let tail = String::from_utf8_lossy(&self.undecoded).into_owned();
            self.partial.push_str(&tail);
            self.undecoded.clear();
        }
        self.discarding = false;
        let rest = std::mem::take(&mut self.partial);
        rest.split(is_line_break).filter_map(complete_line).collect()
    }

    /// Whether a partial line or partial code point is still held.
    pub fn has_pending(&self) -> bool {
        !self.undecoded.is_empty() || !self.partial.is_empty()
    }

    fn decode_available(&mut self) -> String {
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.undecoded) {
                Ok(text) => {
                    out.push_str(text);
                    self.undecoded.clear();
                    return out;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.undecoded[..valid]));
                    match err.error_len() {
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.undecoded.drain(..valid + invalid);
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes.
                            self.undecoded.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    fn drain_complete_lines(&mut self) -> Vec<String> {
        let Some(boundary) = self.partial.rfind(is_line_break) else {
            return Vec::new();
        };
        // Line breaks are single-byte, so boundary + 1 is a char boundary.
        let tail = self.partial.split_off(boundary + 1);
        let complete = std::mem::replace(&mut self.partial, tail);
        complete.split(is_line_break).filter_map(complete_line).collect()
    }
}

struct ReframeState<S> {
    upstream: Pin<Box<S>>,
    reframer: Reframer,
    ready: VecDeque<String>,
    finished: bool,
    frames_sent: usize,
}

impl<S> Drop for ReframeState<S> {
    fn drop(&mut self) {
        debug!(frames = self.frames_sent, "relay stream released");
    }
}

/// Adapt an upstream byte stream into a stream of SSE frames.
///
/// Each frame is yielded as soon as its line is complete. An upstream read
/// error yields a single `RelayError::Stream` and ends the stream; dropping
/// the returned stream drops the upstream with it.
pub fn reframe_stream<S, B, E>(upstream: S) -> impl Stream<Item = Result<String, RelayError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    let state = ReframeState {
        upstream: Box::pin(upstream),
        reframer: Reframer::new(),
        ready: VecDeque::new(),
        finished: false,
        frames_sent: 0,
    };

    unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.ready.pop_front() {
                state.frames_sent += 1;
                return Some((Ok(frame), state));
            }
            if state.finished {
                return None;
            }
            match state.upstream.next().await {
                Some(Ok(chunk)) => {
                    let frames = state.reframer.push(chunk.as_ref());
                    state.ready.extend(frames);
                }
                Some(Err(err)) => {
                    warn!("Upstream stream error: {}", err);
                    state.finished = true;
                    return Some((Err(RelayError::Stream(err.to_string())), state));
                }
                None => {
                    debug!("External API stream finished");
                    state.finished = true;
                    let frames = state.reframer.finish();
                    state.ready.extend(frames);
                }
            }
        }
    })
}
