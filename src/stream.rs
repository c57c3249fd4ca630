//! Decoding of the model's newline-delimited JSON response stream.
//!
//! Ollama streams one JSON object per line. Each object may carry a text
//! fragment at a known path (`message.content` for `/api/chat`,
//! `response` for `/api/generate`). Network chunks do not respect line
//! boundaries, so [`NdjsonDecoder`] buffers the trailing partial line until
//! the rest of it arrives.
//!
//! Lines that are not valid JSON are skipped; one garbled line should not
//! cost the whole response.

use crate::error::TransportError;
use crate::transport::ByteStream;
use futures::StreamExt;
use serde_json::Value;
use tracing::debug;

/// Where the text fragment lives in each streamed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentPath {
    /// `{"message": {"content": "..."}}`: `/api/chat`.
    MessageContent,
    /// `{"response": "..."}`: `/api/generate`.
    Response,
}

impl FragmentPath {
    fn pointer(self) -> &'static str {
        match self {
            FragmentPath::MessageContent => "/message/content",
            FragmentPath::Response => "/response",
        }
    }
}

/// Incremental NDJSON line decoder.
#[derive(Debug)]
pub struct NdjsonDecoder {
    path: FragmentPath,
    buf: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new(path: FragmentPath) -> Self {
        Self {
            path,
            buf: Vec::new(),
        }
    }

    /// Feed one chunk; returns the fragments of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, TransportError> {
        self.buf.extend_from_slice(chunk);
        let mut fragments = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(fragment) = self.decode_line(&line)? {
                fragments.push(fragment);
            }
        }
        Ok(fragments)
    }

    /// Flush a final line that had no trailing newline.
    pub fn finish(&mut self) -> Result<Option<String>, TransportError> {
        let line = std::mem::take(&mut self.buf);
        self.decode_line(&line)
    }

    fn decode_line(&self, line: &[u8]) -> Result<Option<String>, TransportError> {
        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                debug!("Skipping malformed stream line ({}): {:?}", e, text);
                return Ok(None);
            }
        };

        if let Some(err) = value.get("error").and_then(Value::as_str) {
            return Err(TransportError::Model(err.to_string()));
        }

        Ok(value
            .pointer(self.path.pointer())
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string))
    }
}

/// Drain `stream`, concatenating every fragment. `on_fragment` sees each
/// fragment as it arrives.
pub async fn collect_text(
    mut stream: ByteStream,
    path: FragmentPath,
    mut on_fragment: impl FnMut(&str),
) -> Result<String, TransportError> {
    let mut decoder = NdjsonDecoder::new(path);
    let mut text = String::new();

    while let Some(chunk) = stream.next().await {
        for fragment in decoder.push(&chunk?)? {
            on_fragment(&fragment);
            text.push_str(&fragment);
        }
    }
    if let Some(fragment) = decoder.finish()? {
        on_fragment(&fragment);
        text.push_str(&fragment);
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn byte_stream(chunks: &[&str]) -> ByteStream {
        let items: Vec<Result<Vec<u8>, TransportError>> =
            chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        stream::iter(items).boxed()
    }

    #[tokio::test]
    async fn joins_fragments_split_across_chunks() {
        let s = byte_stream(&[
            "{\"message\":{\"content\":\"Invoice \"}}\n{\"mess",
            "age\":{\"content\":\"number: 1\"}}\n",
            "{\"done\":true}",
        ]);
        let text = collect_text(s, FragmentPath::MessageContent, |_| {})
            .await
            .unwrap();
        assert_eq!(text, "Invoice number: 1");
    }

    #[tokio::test]
    async fn skips_malformed_lines() {
        let s = byte_stream(&["not json\n{\"response\":\"ok\"}\n{broken\n"]);
        let text = collect_text(s, FragmentPath::Response, |_| {}).await.unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn reports_every_fragment() {
        let s = byte_stream(&["{\"response\":\"a\"}\n{\"response\":\"b\"}"]);
        let mut seen = Vec::new();
        collect_text(s, FragmentPath::Response, |f| seen.push(f.to_string()))
            .await
            .unwrap();
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn model_error_object_fails() {
        let s = byte_stream(&["{\"error\":\"model not found\"}\n"]);
        let err = collect_text(s, FragmentPath::MessageContent, |_| {})
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Model("model not found".into()));
    }

    #[tokio::test]
    async fn stream_error_propagates() {
        let items: Vec<Result<Vec<u8>, TransportError>> = vec![
            Ok(b"{\"response\":\"a\"}\n".to_vec()),
            Err(TransportError::Stream("reset".into())),
        ];
        let err = collect_text(stream::iter(items).boxed(), FragmentPath::Response, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Stream(_)));
    }

    #[test]
    fn decoder_keeps_partial_line() {
        let mut d = NdjsonDecoder::new(FragmentPath::Response);
        assert!(d.push(b"{\"response\":").unwrap().is_empty());
        assert_eq!(d.push(b"\"x\"}\n").unwrap(), vec!["x".to_string()]);
        assert_eq!(d.finish().unwrap(), None);
    }
}
