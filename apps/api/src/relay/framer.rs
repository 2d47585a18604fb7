//! Wire format between server and browser: one `data: <json>\n\n` record per event.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One event of an interview turn as seen by the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Content {
        content: String,
        #[serde(rename = "isLastMessage")]
        is_last_message: bool,
    },
    Error {
        error: String,
    },
}

impl StreamEvent {
    pub fn content(text: impl Into<String>) -> Self {
        StreamEvent::Content {
            content: text.into(),
            is_last_message: false,
        }
    }

    /// The end-of-turn marker: empty content with `isLastMessage: true`.
    pub fn last() -> Self {
        StreamEvent::Content {
            content: String::new(),
            is_last_message: true,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            error: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            StreamEvent::Content {
                is_last_message, ..
            } => *is_last_message,
            StreamEvent::Error { .. } => true,
        }
    }
}

pub fn encode(event: &StreamEvent) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(event)?;
    Ok(Bytes::from(format!("data: {json}\n\n")))
}

/// Parses a complete SSE body back into events. Records that are not
/// `data:` lines are ignored.
pub fn decode(body: &str) -> Result<Vec<StreamEvent>, serde_json::Error> {
    body.split("\n\n")
        .filter_map(|record| record.trim_start_matches('\n').strip_prefix("data: "))
        .map(serde_json::from_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_content_wire_shape() {
        let bytes = encode(&StreamEvent::content("你好")).unwrap();
        assert_eq!(
            &bytes[..],
            "data: {\"content\":\"你好\",\"isLastMessage\":false}\n\n".as_bytes()
        );
    }

    #[test]
    fn test_encode_last_and_error() {
        assert_eq!(
            &encode(&StreamEvent::last()).unwrap()[..],
            b"data: {\"content\":\"\",\"isLastMessage\":true}\n\n"
        );
        assert_eq!(
            &encode(&StreamEvent::error("bad")).unwrap()[..],
            b"data: {\"error\":\"bad\"}\n\n"
        );
    }

    #[test]
    fn test_content_with_newlines_stays_one_record() {
        let bytes = encode(&StreamEvent::content("a\n\nb")).unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert_eq!(text.matches("\n\n").count(), 1);
        assert_eq!(decode(text).unwrap(), vec![StreamEvent::content("a\n\nb")]);
    }

    #[test]
    fn test_decode_sequence() {
        let body = "data: {\"content\":\"a\",\"isLastMessage\":false}\n\n\
                    : comment\n\n\
                    data: {\"content\":\"\",\"isLastMessage\":true}\n\n";
        let events = decode(body).unwrap();
        assert_eq!(events, vec![StreamEvent::content("a"), StreamEvent::last()]);
        assert!(events[1].is_terminal());
        assert!(!events[0].is_terminal());
    }

    #[test]
    fn test_decode_error_event() {
        let events = decode("data: {\"error\":\"x\"}\n\n").unwrap();
        assert_eq!(events, vec![StreamEvent::error("x")]);
        assert!(events[0].is_terminal());
    }
}
