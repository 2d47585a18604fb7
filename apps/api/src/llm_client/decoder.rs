//! Incremental decoder for the upstream chat-completion event stream.
//!
//! Network reads do not line up with `data:` lines, so bytes are buffered
//! until a full line is available. A line that fails to parse is logged and
//! skipped; it never aborts the stream.

use serde::Deserialize;
use tracing::warn;

use super::LlmError;

#[derive(Debug, Clone, PartialEq)]
pub enum ChunkEvent {
    /// A non-empty text fragment.
    Delta(String),
    /// The vendor reported an error inside an otherwise healthy stream.
    Failed(String),
    /// `data: [DONE]`
    Done,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ChunkError>,
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

#[derive(Debug, Deserialize)]
struct ChunkError {
    message: String,
}

/// Longest line kept while waiting for its newline. Anything longer is
/// dropped up to the next newline and counted as malformed.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Default)]
pub struct ChunkDecoder {
    pending: Vec<u8>,
    /// Prefix of `pending` already known to hold no newline.
    scanned: usize,
    /// Inside an overlong line; bytes are dropped until the next newline.
    discarding: bool,
    malformed: usize,
}

impl ChunkDecoder {
    /// Feeds one network read and returns the events completed by it.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<ChunkEvent> {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(bytes);

        let mut events = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = buf[from..].iter().position(|b| *b == b'\n') {
            let end = from + offset;
            if self.discarding {
                self.discarding = false;
            } else if let Some(event) = self.accept(&buf[start..end]) {
                events.push(event);
            }
            start = end + 1;
            from = start;
        }
        buf.drain(..start);

        if buf.len() > MAX_LINE_BYTES {
            if !self.discarding {
                self.reject(LlmError::UpstreamParse(format!(
                    "line exceeds {MAX_LINE_BYTES} bytes"
                )));
                self.discarding = true;
            }
            buf.clear();
        }
        self.scanned = buf.len();
        self.pending = buf;
        events
    }

    /// Flushes a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Vec<ChunkEvent> {
        let line = std::mem::take(&mut self.pending);
        self.scanned = 0;
        if std::mem::take(&mut self.discarding) {
            return Vec::new();
        }
        self.accept(&line).into_iter().collect()
    }

    /// Number of lines skipped because they could not be parsed.
    pub fn malformed(&self) -> usize {
        self.malformed
    }

    fn accept(&mut self, line: &[u8]) -> Option<ChunkEvent> {
        match decode_line(line) {
            Ok(event) => event,
            Err(e) => {
                self.reject(e);
                None
            }
        }
    }

    fn reject(&mut self, e: LlmError) {
        self.malformed += 1;
        warn!("Skipping upstream chunk: {e}");
    }
}

fn decode_line(line: &[u8]) -> Result<Option<ChunkEvent>, LlmError> {
    let line = std::str::from_utf8(line)
        .map_err(|e| LlmError::UpstreamParse(format!("invalid UTF-8: {e}")))?
        .trim_end_matches('\r');

    let Some(payload) = line.strip_prefix("data:") else {
        // comments, `event:` and `id:` fields carry nothing we relay
        return Ok(None);
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(None);
    }
    if payload == "[DONE]" {
        return Ok(Some(ChunkEvent::Done));
    }

    let chunk: CompletionChunk = serde_json::from_str(payload)
        .map_err(|e| LlmError::UpstreamParse(format!("{e}: {payload}")))?;

    if let Some(error) = chunk.error {
        return Ok(Some(ChunkEvent::Failed(error.message)));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty())
        .map(ChunkEvent::Delta))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": text}}]})
        )
    }

    #[test]
    fn test_single_read_multiple_lines() {
        let mut decoder = ChunkDecoder::default();
        let input = format!("{}{}data: [DONE]\n\n", delta("你好"), delta("，请"));
        let events = decoder.push(input.as_bytes());
        assert_eq!(
            events,
            vec![
                ChunkEvent::Delta("你好".into()),
                ChunkEvent::Delta("，请".into()),
                ChunkEvent::Done
            ]
        );
    }

    #[test]
    fn test_line_split_across_reads_mid_utf8() {
        let mut decoder = ChunkDecoder::default();
        let input = delta("面试");
        let bytes = input.as_bytes();
        // split inside the first multi-byte character
        let cut = input.find('面').unwrap() + 1;
        assert!(decoder.push(&bytes[..cut]).is_empty());
        assert_eq!(
            decoder.push(&bytes[cut..]),
            vec![ChunkEvent::Delta("面试".into())]
        );
    }

    #[test]
    fn test_malformed_line_is_skipped_and_counted() {
        let mut decoder = ChunkDecoder::default();
        let input = format!("data: {{not json\n{}", delta("ok"));
        let events = decoder.push(input.as_bytes());
        assert_eq!(events, vec![ChunkEvent::Delta("ok".into())]);
        assert_eq!(decoder.malformed(), 1);
    }

    #[test]
    fn test_role_only_and_empty_deltas_yield_nothing() {
        let mut decoder = ChunkDecoder::default();
        let input = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\
                     data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\
                     data: {\"choices\":[]}\n";
        assert!(decoder.push(input.as_bytes()).is_empty());
        assert_eq!(decoder.malformed(), 0);
    }

    #[test]
    fn test_non_data_lines_ignored() {
        let mut decoder = ChunkDecoder::default();
        let input = ": keep-alive\nevent: message\nid: 7\n\r\n";
        assert!(decoder.push(input.as_bytes()).is_empty());
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut decoder = ChunkDecoder::default();
        let input = "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\r\n\r\n";
        assert_eq!(
            decoder.push(input.as_bytes()),
            vec![ChunkEvent::Delta("a".into())]
        );
    }

    #[test]
    fn test_vendor_error_inside_stream() {
        let mut decoder = ChunkDecoder::default();
        let input = "data: {\"error\":{\"message\":\"quota exceeded\"}}\n";
        assert_eq!(
            decoder.push(input.as_bytes()),
            vec![ChunkEvent::Failed("quota exceeded".into())]
        );
    }

    #[test]
    fn test_overlong_line_is_dropped_once() {
        let mut decoder = ChunkDecoder::default();
        let filler = vec![b'x'; 64 * 1024];
        let mut events = decoder.push(b"data: {\"choices\":\"");
        for _ in 0..(MAX_LINE_BYTES / filler.len() + 2) {
            events.extend(decoder.push(&filler));
        }
        events.extend(decoder.push(format!("\"}}\n{}", delta("next")).as_bytes()));

        assert_eq!(events, vec![ChunkEvent::Delta("next".into())]);
        assert_eq!(decoder.malformed(), 1);
        assert!(decoder.pending.is_empty());
    }

    #[test]
    fn test_byte_at_a_time_reads() {
        let mut decoder = ChunkDecoder::default();
        let input = format!("{}data: [DONE]\n", delta("逐字"));
        let events: Vec<ChunkEvent> = input
            .as_bytes()
            .iter()
            .flat_map(|b| decoder.push(std::slice::from_ref(b)))
            .collect();
        assert_eq!(events, vec![ChunkEvent::Delta("逐字".into()), ChunkEvent::Done]);
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = ChunkDecoder::default();
        let input = "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}";
        assert!(decoder.push(input.as_bytes()).is_empty());
        assert_eq!(decoder.finish(), vec![ChunkEvent::Delta("tail".into())]);
        assert!(decoder.finish().is_empty());
    }
}
