//! Line buffering for `text/event-stream` bodies.
//!
//! Network chunks do not line up with SSE events: one chunk may carry several
//! `data:` lines, and a JSON payload (or a single multibyte character) may be
//! split across two chunks. The buffer keeps the raw bytes of the trailing
//! partial line until its newline arrives, and only decodes whole lines.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use std::mem;

use super::DeltaStream;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns every event completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Parses whatever is left once the body has ended.
    pub fn flush(&mut self) -> Option<SseEvent> {
        parse_line(&String::from_utf8_lossy(&mem::take(&mut self.buffer)))
    }
}

fn parse_line(line: &str) -> Option<SseEvent> {
    let line = line.trim();
    if line == "data: [DONE]" {
        return Some(SseEvent::Done);
    }
    // event:, id:, retry: and comments are ignored
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() {
        None
    } else {
        Some(SseEvent::Data(data.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// Text carried by one chat-completions stream chunk, if any.
fn chunk_text(json: &str) -> Result<Option<String>, AppError> {
    let chunk: CompletionChunk = serde_json::from_str(json)
        .map_err(|e| AppError::Upstream(format!("Malformed stream chunk: {e}")))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|text| !text.is_empty()))
}

/// Turns a chat-completions SSE body into a stream of text deltas. Ends at
/// `[DONE]` or when the body ends.
pub fn delta_stream<S>(body: S) -> DeltaStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut body = Box::pin(body);
        let mut parser = SseLineBuffer::new();

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(AppError::Upstream(format!("Stream read error: {e}")));
                    return;
                }
            };
            for event in parser.feed(&chunk) {
                match event {
                    SseEvent::Done => return,
                    SseEvent::Data(json) => match chunk_text(&json) {
                        Ok(Some(text)) => yield Ok(text),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    },
                }
            }
        }

        if let Some(SseEvent::Data(json)) = parser.flush() {
            match chunk_text(&json) {
                Ok(Some(text)) => yield Ok(text),
                Ok(None) => {}
                Err(e) => yield Err(e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "choices": [{ "delta": { "content": text } }] })
        )
    }

    #[test]
    fn test_multiple_events_in_one_chunk() {
        let mut parser = SseLineBuffer::new();
        let events = parser.feed(b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\ndata: [DONE]\n\n");
        assert_eq!(
            events,
            vec![
                SseEvent::Data("{\"a\":1}".into()),
                SseEvent::Data("{\"b\":2}".into()),
                SseEvent::Done,
            ]
        );
    }

    #[test]
    fn test_payload_split_across_chunks() {
        let mut parser = SseLineBuffer::new();
        assert!(parser.feed(b"data: {\"con").is_empty());
        assert_eq!(
            parser.feed(b"tent\":\"x\"}\r\n"),
            vec![SseEvent::Data("{\"content\":\"x\"}".into())]
        );
    }

    #[test]
    fn test_character_split_across_chunks() {
        let line = chunk("café 20°C");
        let bytes = line.as_bytes();
        // split inside the two-byte 'é'
        let cut = line.find('é').unwrap() + 1;

        let mut parser = SseLineBuffer::new();
        assert!(parser.feed(&bytes[..cut]).is_empty());
        let events = parser.feed(&bytes[cut..]);
        let [SseEvent::Data(json)] = events.as_slice() else {
            panic!("expected one data event, got {events:?}");
        };
        assert_eq!(chunk_text(json).unwrap().as_deref(), Some("café 20°C"));
    }

    #[test]
    fn test_flush_returns_unterminated_line() {
        let mut parser = SseLineBuffer::new();
        assert!(parser.feed(b": keep-alive\ndata: tail").is_empty());
        assert_eq!(parser.flush(), Some(SseEvent::Data("tail".into())));
        assert_eq!(parser.flush(), None);
    }

    #[tokio::test]
    async fn test_delta_stream_stops_at_done() {
        let body = format!(
            "{}{}data: {{\"choices\":[{{\"delta\":{{}}}}]}}\n\ndata: [DONE]\n\n{}",
            chunk("Hel"),
            chunk("lo"),
            chunk("ignored")
        );
        let (first, rest) = body.split_at(10);
        let parts: Vec<Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::from(first.to_string())),
            Ok(Bytes::from(rest.to_string())),
        ];

        let deltas: Vec<String> = delta_stream(futures_util::stream::iter(parts))
            .map(|d| d.unwrap())
            .collect()
            .await;
        assert_eq!(deltas, vec!["Hel".to_string(), "lo".to_string()]);
    }
}
