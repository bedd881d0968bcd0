//! Shared plumbing for streaming LLM responses: both SSE (`data: ` framed)
//! and NDJSON bodies arrive as byte chunks that must be re-split on line
//! boundaries before parsing.

use futures_util::stream::{self, BoxStream, StreamExt};

use crate::domain::DomainError;

/// Convert a streaming HTTP body into a stream of complete, non-empty lines.
pub(crate) fn lines(response: reqwest::Response) -> BoxStream<'static, Result<String, DomainError>> {
    response
        .bytes_stream()
        .map(|chunk| chunk.map_err(|e| DomainError::llm(format!("Stream read failed: {}", e))))
        .scan(String::new(), |buffer, chunk| {
            let out: Vec<Result<String, DomainError>> = match chunk {
                Ok(bytes) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    let mut complete = Vec::new();
                    while let Some(pos) = buffer.find('\n') {
                        let line = buffer[..pos].trim_end_matches('\r').to_string();
                        buffer.drain(..=pos);
                        if !line.is_empty() {
                            complete.push(Ok(line));
                        }
                    }
                    complete
                }
                Err(e) => vec![Err(e)],
            };
            futures_util::future::ready(Some(stream::iter(out)))
        })
        .flatten()
        .boxed()
}

/// Strip the SSE `data: ` framing from a line, if present.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_data_framing() {
        assert_eq!(sse_data("data: {\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(sse_data("data:[DONE]"), Some("[DONE]"));
        assert_eq!(sse_data("event: ping"), None);
    }
}
