/*!
 * Incremental Server-Sent-Events parsing.
 *
 * `parse_sse` is a pure function over a text buffer: it returns every event
 * closed by a blank line plus the unconsumed remainder, which starts at the
 * first line of the event still open (or at the partial last line). Feeding
 * `remainder + next_chunk` back in yields the same events no matter where
 * the chunks were cut.
 *
 * `SseParser` wraps it for byte streams and keeps multi-byte UTF-8
 * sequences that were split across chunks.
 */

/// A decoded event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub id: Option<String>,
    pub retry: Option<u64>,
    /// Data lines joined with `\n`
    pub data: String,
}

#[derive(Default)]
struct OpenEvent {
    event: Option<String>,
    id: Option<String>,
    retry: Option<u64>,
    data: Vec<String>,
}

impl OpenEvent {
    fn apply(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let Some((field, value)) = line.split_once(':') else {
            return;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            "retry" => {
                if let Ok(retry) = value.trim().parse() {
                    self.retry = Some(retry);
                }
            }
            _ => {}
        }
    }

    fn close(self) -> Option<SseEvent> {
        if self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event: self.event,
            id: self.id,
            retry: self.retry,
            data: self.data.join("\n"),
        })
    }
}

/// Parse complete events out of `buffer`
///
/// Lines end at `\n`, with an optional `\r` before it. A blank line closes
/// the open event, which is emitted only if it collected at least one data
/// line. Comment lines (`:`) and lines without a colon are ignored.
pub fn parse_sse(buffer: &str) -> (Vec<SseEvent>, String) {
    let mut events = Vec::new();
    let mut open = OpenEvent::default();
    let mut open_since = 0;
    let mut pos = 0;

    while let Some(offset) = buffer[pos..].find('\n') {
        let line_end = pos + offset;
        let line = buffer[pos..line_end].strip_suffix('\r').unwrap_or(&buffer[pos..line_end]);
        pos = line_end + 1;

        if line.is_empty() {
            if let Some(event) = std::mem::take(&mut open).close() {
                events.push(event);
            }
            open_since = pos;
        } else {
            open.apply(line);
        }
    }

    (events, buffer[open_since..].to_string())
}

/// Stateful wrapper feeding chunks through `parse_sse`
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence
    pending: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed decoded text
    pub fn feed(&mut self, text: &str) -> Vec<SseEvent> {
        self.buffer.push_str(text);
        let (events, remainder) = parse_sse(&self.buffer);
        self.buffer = remainder;
        events
    }

    /// Feed raw bytes from the response body
    pub fn feed_bytes(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        let mut text = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));
                    match e.error_len() {
                        // incomplete sequence at the end, wait for more bytes
                        None => {
                            self.pending.drain(..valid_up_to);
                            break;
                        }
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + len);
                        }
                    }
                }
            }
        }

        self.feed(&text)
    }

    /// Flush at end of stream, closing an event the server left open
    pub fn finish(&mut self) -> Vec<SseEvent> {
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.buffer.push_str(&tail);
            self.pending.clear();
        }
        if self.buffer.trim().is_empty() {
            self.buffer.clear();
            return Vec::new();
        }

        let mut rest = std::mem::take(&mut self.buffer);
        rest.push_str("\n\n");
        parse_sse(&rest).0
    }

    /// Unconsumed text
    pub fn remainder(&self) -> &str {
        &self.buffer
    }
}
