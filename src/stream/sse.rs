// Incremental parser for server-sent event frames

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub name: String,
    pub data: String,
}

/// Feeds on raw transport chunks and yields complete events.
///
/// Chunk boundaries carry no meaning: frames, lines, and even UTF-8
/// sequences may be split across chunks, so the parser buffers bytes and
/// only decodes whole lines. Comment lines and unknown fields (`id`,
/// `retry`) are ignored; the reconnect delay is fixed by configuration, not
/// negotiated by the server.
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    buffer: Vec<u8>,
    event_name: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop(); // the \n
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.take_line(&line) {
                events.push(event);
            }
        }
        events
    }

    fn take_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            // Blank line dispatches the pending event. No accumulated data
            // means nothing to dispatch, even if a name was set.
            let data = std::mem::take(&mut self.data);
            let name = self.event_name.take();
            if data.is_empty() {
                return None;
            }
            return Some(SseEvent {
                name: name.unwrap_or_else(|| "message".to_string()),
                data: data.join("\n"),
            });
        }

        if line.starts_with(':') {
            return None; // comment / heartbeat
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event_name = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_str(parser: &mut SseParser, s: &str) -> Vec<SseEvent> {
        parser.feed(s.as_bytes())
    }

    #[test]
    fn parses_named_event() {
        let mut parser = SseParser::new();
        let events = feed_str(
            &mut parser,
            "event: notification\ndata: {\"id\":\"n1\"}\n\n",
        );
        assert_eq!(
            events,
            vec![SseEvent {
                name: "notification".to_string(),
                data: "{\"id\":\"n1\"}".to_string(),
            }]
        );
    }

    #[test]
    fn frame_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(feed_str(&mut parser, "event: pi").is_empty());
        assert!(feed_str(&mut parser, "ng\ndata: {}").is_empty());
        let events = feed_str(&mut parser, "\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "ping");
        assert_eq!(events[0].data, "{}");
    }

    #[test]
    fn multiple_events_in_one_chunk() {
        let mut parser = SseParser::new();
        let events = feed_str(
            &mut parser,
            "event: connected\ndata: {\"status\":\"connected\"}\n\nevent: ping\ndata: {}\n\n",
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "connected");
        assert_eq!(events[1].name, "ping");
    }

    #[test]
    fn multi_line_data_joined_with_newline() {
        let mut parser = SseParser::new();
        let events = feed_str(&mut parser, "data: first\ndata: second\n\n");
        assert_eq!(events[0].data, "first\nsecond");
        assert_eq!(events[0].name, "message");
    }

    #[test]
    fn crlf_line_endings() {
        let mut parser = SseParser::new();
        let events = feed_str(&mut parser, "event: ping\r\ndata: {}\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "ping");
    }

    #[test]
    fn comments_are_ignored() {
        let mut parser = SseParser::new();
        let events = feed_str(&mut parser, ": keepalive comment\n\nevent: ping\ndata: x\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "ping");
    }

    #[test]
    fn name_without_data_dispatches_nothing() {
        let mut parser = SseParser::new();
        let events = feed_str(&mut parser, "event: connected\n\nevent: ping\ndata: {}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "ping");
    }

    #[test]
    fn utf8_split_across_chunks_survives() {
        let mut parser = SseParser::new();
        let frame = "data: caf\u{e9}\n\n".as_bytes();
        // Split inside the two-byte e-acute sequence.
        let split = frame.len() - 3;
        assert!(parser.feed(&frame[..split]).is_empty());
        let events = parser.feed(&frame[split..]);
        assert_eq!(events[0].data, "caf\u{e9}");
    }
}
