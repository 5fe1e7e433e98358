//! Parsing of OpenAI-style `data:` event lines and incremental UTF-8 decoding.
//!
//! Each network read is decoded and split into lines on its own. Only the
//! bytes of an unfinished multi-byte character carry over to the next read;
//! a line cut in half by a read boundary fails to parse and is skipped.

/// Outcome of parsing one line of a chat-completions event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Blank, non-`data:` or unparseable line, or a record without content.
    Skip,
    /// End-of-stream sentinel.
    Done,
    /// Incremental text fragment.
    Token(String),
}

pub const DONE_SENTINEL: &str = "[DONE]";

/// Classify a single line.
pub fn parse_line(line: &str) -> LineEvent {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineEvent::Skip;
    }

    let payload = match trimmed.strip_prefix("data:") {
        Some(rest) => rest.trim(),
        None if trimmed == DONE_SENTINEL => return LineEvent::Done,
        None => return LineEvent::Skip,
    };

    if payload == DONE_SENTINEL {
        return LineEvent::Done;
    }

    match extract_delta(payload) {
        Some(token) => LineEvent::Token(token),
        None => LineEvent::Skip,
    }
}

/// Pull `choices[0].delta.content` out of a JSON record, if non-empty.
pub fn extract_delta(payload: &str) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(payload).ok()?;
    parsed["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Parse every line of one decoded read, in order.
pub fn parse_chunk(text: &str) -> impl Iterator<Item = LineEvent> + '_ {
    text.split('\n').map(parse_line)
}

/// Streaming UTF-8 decoder. Holds back the bytes of a character split across
/// reads; invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next read, returning all text that is complete so far.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        let tail = rest.to_vec();
        self.pending = tail;
        out
    }

    /// Flush whatever is left at end of input.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
