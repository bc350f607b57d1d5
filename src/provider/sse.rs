//! Byte-level decoder for server-sent-event style streams.
//!
//! All three provider dialects frame their payloads as newline-terminated
//! lines; the decoder owns the carry-over buffer so a frame split across
//! transport chunks is never parsed early. `event:` lines tag the following
//! `data:` line (Anthropic); comment and malformed lines are skipped because
//! providers interleave heartbeats with payload frames.

use memchr::memchr;

/// One complete protocol frame: a data payload plus the event name that
/// preceded it, when the dialect uses named events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

#[derive(Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    current_event: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a raw transport chunk, returning every frame whose terminating
    /// newline has now been observed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let line = match std::str::from_utf8(&self.buffer[..newline_pos]) {
                Ok(s) => s.trim().to_string(),
                Err(_) => {
                    // Drop the undecodable line; the stream itself survives.
                    self.buffer.drain(..=newline_pos);
                    continue;
                }
            };
            self.buffer.drain(..=newline_pos);

            if let Some(frame) = self.take_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush any unterminated trailing line once the transport has ended.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::str::from_utf8(&self.buffer)
            .ok()
            .map(|s| s.trim().to_string());
        self.buffer.clear();
        self.take_line(&line?)
    }

    fn take_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            // Blank line ends an event block.
            self.current_event = None;
            return None;
        }
        if let Some(name) = line.strip_prefix("event:") {
            self.current_event = Some(name.trim().to_string());
            return None;
        }
        if let Some(payload) = line.strip_prefix("data:") {
            return Some(SseFrame {
                event: self.current_event.clone(),
                data: payload.trim_start().to_string(),
            });
        }
        // Comment (":keepalive") or unknown field: skip silently.
        None
    }
}
