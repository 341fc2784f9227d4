//! Lossless bidirectional translation between byte streams and SSE events.
//!
//! [`SseParser`] accepts bytes incrementally and yields [`SseEvent`]s as
//! complete records appear; [`SseEvent::write`] is its exact inverse.
//! `parse ∘ serialize` is the identity on well-formed input (modulo
//! whitespace within a `data:` payload, per spec §8).

use std::fmt::Write as _;

use bytes::{Bytes, BytesMut};
use serde_json::Value;

/// The literal `data: [DONE]` terminator some vendors use to end a stream.
pub const DONE_MARKER: &str = "[DONE]";

/// One parsed SSE record.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    /// The `event:` field, if present.
    pub event: Option<String>,
    /// The `id:` field, if present.
    pub id: Option<String>,
    /// The `retry:` field, if present (milliseconds).
    pub retry: Option<u64>,
    /// The `data:` payload.
    pub data: SseData,
}

/// The parsed form of an event's `data:` field(s).
#[derive(Debug, Clone, PartialEq)]
pub enum SseData {
    /// `data:` lines joined by `\n` and parsed as JSON.
    Json(Value),
    /// The literal `data: [DONE]` sentinel.
    Done,
    /// `data:` lines joined by `\n` that failed to parse as JSON — surfaced
    /// rather than silently dropped, per §4.B.
    Raw(String),
    /// No `data:` field was present at all (e.g. a bare `event:`/`id:`
    /// record, or a comment-only/keep-alive record).
    Empty,
}

impl SseEvent {
    /// Build a JSON data event with no `event`/`id`/`retry` fields.
    #[must_use]
    pub fn data(value: Value) -> Self {
        Self {
            event: None,
            id: None,
            retry: None,
            data: SseData::Json(value),
        }
    }

    /// Build a named JSON data event.
    #[must_use]
    pub fn named(event: impl Into<String>, value: Value) -> Self {
        Self {
            event: Some(event.into()),
            id: None,
            retry: None,
            data: SseData::Json(value),
        }
    }

    /// Build the terminal `data: [DONE]` event.
    #[must_use]
    pub fn done() -> Self {
        Self {
            event: None,
            id: None,
            retry: None,
            data: SseData::Done,
        }
    }

    /// Serialize this event to the wire format: `event:`/`id:`/`retry:`
    /// lines as present, then one or more `data:` lines, then a blank line.
    #[must_use]
    pub fn write(&self) -> String {
        let mut out = String::new();
        if let Some(event) = &self.event {
            let _ = writeln!(out, "event: {event}");
        }
        if let Some(id) = &self.id {
            let _ = writeln!(out, "id: {id}");
        }
        if let Some(retry) = &self.retry {
            let _ = writeln!(out, "retry: {retry}");
        }
        match &self.data {
            SseData::Json(value) => {
                let payload = serde_json::to_string(value).unwrap_or_default();
                for line in payload.split('\n') {
                    let _ = writeln!(out, "data: {line}");
                }
            }
            SseData::Done => {
                let _ = writeln!(out, "data: {DONE_MARKER}");
            }
            SseData::Raw(raw) => {
                for line in raw.split('\n') {
                    let _ = writeln!(out, "data: {line}");
                }
            }
            SseData::Empty => {}
        }
        out.push('\n');
        out
    }
}

/// Incremental SSE parser.
///
/// Feed bytes with [`SseParser::push`]; drain complete events with
/// [`SseParser::next_event`]. Call [`SseParser::finish`] at end-of-stream
/// to flush a trailing event that had no closing blank line.
#[derive(Debug, Default)]
pub struct SseParser {
    buf: BytesMut,
}

/// One raw field line within an SSE record, before data-line aggregation.
enum Field<'a> {
    Event(&'a str),
    Id(&'a str),
    Retry(&'a str),
    Data(&'a str),
    Other,
}

fn parse_field(line: &str) -> Field<'_> {
    if let Some(rest) = line.strip_prefix("event:") {
        Field::Event(rest.trim_start())
    } else if let Some(rest) = line.strip_prefix("id:") {
        Field::Id(rest.trim_start())
    } else if let Some(rest) = line.strip_prefix("retry:") {
        Field::Retry(rest.trim_start())
    } else if let Some(rest) = line.strip_prefix("data:") {
        Field::Data(rest.trim_start())
    } else {
        Field::Other
    }
}

/// Parse one complete record (the lines between blank-line boundaries,
/// with the trailing blank line already stripped) into an [`SseEvent`].
/// Returns `None` if the record carried no recognized fields at all.
fn parse_record(record: &str) -> Option<SseEvent> {
    if record.is_empty() {
        return None;
    }
    let mut event = None;
    let mut id = None;
    let mut retry = None;
    let mut data_lines: Vec<&str> = Vec::new();
    let mut saw_any = false;

    for line in record.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        saw_any = true;
        match parse_field(line) {
            Field::Event(v) => event = Some(v.to_string()),
            Field::Id(v) => id = Some(v.to_string()),
            Field::Retry(v) => retry = v.parse::<u64>().ok(),
            Field::Data(v) => data_lines.push(v),
            Field::Other => {}
        }
    }

    if !saw_any {
        return None;
    }

    let data = if data_lines.is_empty() {
        SseData::Empty
    } else {
        let joined = data_lines.join("\n");
        if joined == DONE_MARKER {
            SseData::Done
        } else {
            match serde_json::from_str::<Value>(&joined) {
                Ok(value) => SseData::Json(value),
                Err(_) => SseData::Raw(joined),
            }
        }
    };

    Some(SseEvent {
        event,
        id,
        retry,
        data,
    })
}

impl SseParser {
    /// Create an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every complete event record found so far.
    /// Incomplete trailing bytes are retained for the next call.
    pub fn push(&mut self, bytes: &Bytes) -> Vec<SseEvent> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();

        loop {
            let haystack = &self.buf[..];
            let boundary = find_blank_line(haystack);
            let Some((record_end, consumed)) = boundary else {
                break;
            };
            let record = String::from_utf8_lossy(&haystack[..record_end]).into_owned();
            self.buf = BytesMut::from(&self.buf[consumed..]);
            if let Some(event) = parse_record(&record) {
                out.push(event);
            }
        }

        out
    }

    /// Flush a trailing event that never received a closing blank line
    /// (end-of-stream). Returns `None` if there is nothing buffered.
    pub fn finish(mut self) -> Option<SseEvent> {
        let record = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        parse_record(&record)
    }
}

/// Find a blank-line boundary (`\n\n` or `\r\n\r\n`), returning
/// `(record_end, bytes_consumed)` where `record_end` excludes the boundary
/// itself and `bytes_consumed` includes it.
fn find_blank_line(haystack: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 1 < haystack.len() {
        if haystack[i] == b'\n' {
            if haystack[i + 1] == b'\n' {
                return Some((i, i + 2));
            }
        } else if haystack[i] == b'\r'
            && i + 3 < haystack.len()
            && &haystack[i + 1..i + 4] == b"\n\r\n"
        {
            return Some((i, i + 4));
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trip_simple_event() {
        let event = SseEvent::named("content_block_delta", json!({"index": 0}));
        let wire = event.write();
        let mut parser = SseParser::new();
        let mut parsed = parser.push(&Bytes::from(wire));
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.remove(0), event);
    }

    #[test]
    fn done_marker_round_trips() {
        let event = SseEvent::done();
        let wire = event.write();
        assert_eq!(wire, "data: [DONE]\n\n");
        let mut parser = SseParser::new();
        let parsed = parser.push(&Bytes::from(wire));
        assert_eq!(parsed, vec![event]);
    }

    #[test]
    fn incomplete_event_is_buffered_until_boundary() {
        let mut parser = SseParser::new();
        let first = parser.push(&Bytes::from_static(b"event: ping\ndata: {}"));
        assert!(first.is_empty());
        let second = parser.push(&Bytes::from_static(b"\n\n"));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].event.as_deref(), Some("ping"));
    }

    #[test]
    fn multiple_events_in_one_push() {
        let mut parser = SseParser::new();
        let wire = format!("{}{}", SseEvent::data(json!(1)).write(), SseEvent::data(json!(2)).write());
        let events = parser.push(&Bytes::from(wire));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn malformed_json_surfaces_as_raw() {
        let mut parser = SseParser::new();
        let events = parser.push(&Bytes::from_static(b"data: {not json\n\n"));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].data, SseData::Raw(_)));
    }

    #[test]
    fn finish_flushes_trailing_event_without_blank_line() {
        let mut parser = SseParser::new();
        let events = parser.push(&Bytes::from_static(b"data: {\"a\":1}"));
        assert!(events.is_empty());
        let flushed = parser.finish();
        assert!(flushed.is_some());
    }

    #[test]
    fn multiline_data_is_joined_with_newline() {
        let mut parser = SseParser::new();
        let events = parser.push(&Bytes::from_static(b"data: line1\ndata: line2\n\n"));
        assert_eq!(events.len(), 1);
        match &events[0].data {
            SseData::Raw(s) => assert_eq!(s, "line1\nline2"),
            other => panic!("expected raw, got {other:?}"),
        }
    }
}
