//! Server-sent event decoding for streamed purchases
//!
//! The body arrives as arbitrary byte chunks. [`SseDecoder`] buffers partial
//! lines across chunk boundaries and yields complete events in order.

/// One dispatched event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, `None` for the default type
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
}

/// How the purchase stream interprets an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind<'a> {
    Data,
    Error,
    Done,
    Other(&'a str),
}

impl SseEvent {
    pub fn kind(&self) -> EventKind<'_> {
        match self.event.as_deref() {
            None | Some("") | Some("data") | Some("message") => EventKind::Data,
            Some("error") => EventKind::Error,
            Some("done") => EventKind::Done,
            Some(other) => EventKind::Other(other),
        }
    }
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes from the network and return every event they complete.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some((line_end, next_start)) = self.next_line_bounds() {
            let line = String::from_utf8_lossy(&self.buffer[..line_end]).into_owned();
            self.buffer.drain(..next_start);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush at end of body. A trailing event without its blank-line
    /// terminator is still delivered.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            let line = line.trim_end_matches('\r');
            if let Some(event) = self.process_line(line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    /// Locate the first complete line: (end of content, start of next line).
    /// A lone `\r` at the end of the buffer waits for more input in case a
    /// `\n` follows in the next chunk.
    fn next_line_bounds(&self) -> Option<(usize, usize)> {
        let pos = self.buffer.iter().position(|&b| b == b'\n' || b == b'\r')?;
        if self.buffer[pos] == b'\n' {
            return Some((pos, pos + 1));
        }
        match self.buffer.get(pos + 1) {
            Some(b'\n') => Some((pos, pos + 2)),
            Some(_) => Some((pos, pos + 1)),
            None => None,
        }
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id, retry and unknown fields carry nothing the relay uses
            _ => {},
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() && self.event.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: self.event.take(),
            data,
        })
    }
}
