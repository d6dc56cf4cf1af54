//! HTTP plumbing shared by the backends: client construction, status
//! mapping and server-sent-event line splitting.

use std::time::Duration;
use tollgate_core::BackendError;
use tracing::warn;

pub(crate) fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to configure HTTP client, using defaults");
            reqwest::Client::new()
        })
}

pub(crate) fn send_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(e.to_string())
    } else {
        BackendError::Network(e.to_string())
    }
}

/// Turn non-success statuses into the matching [`BackendError`].
pub(crate) async fn check_status(
    backend: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status().as_u16();
    match status {
        200..=299 => Ok(response),
        429 => Err(BackendError::RateLimited {
            retry_after_secs: retry_after(&response).unwrap_or(5),
        }),
        401 | 403 => Err(BackendError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        )),
        _ => {
            let body = response.text().await.unwrap_or_default();
            warn!(backend, status, body = %body, "Backend returned error");
            Err(BackendError::Api {
                status_code: status,
                message: body,
            })
        }
    }
}

fn retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Accumulates raw SSE bytes and yields complete lines.
///
/// Bytes are buffered undecoded so a multi-byte character split across two
/// network chunks is reassembled before decoding.
#[derive(Debug, Default)]
pub(crate) struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    pub fn next_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=end).collect();
        let line = String::from_utf8_lossy(&raw[..end]);
        Some(line.trim_end_matches('\r').to_string())
    }
}

/// One meaningful SSE line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseLine<'a> {
    Event(&'a str),
    Data(&'a str),
}

pub(crate) fn classify(line: &str) -> Option<SseLine<'_>> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    if let Some(event) = line.strip_prefix("event:") {
        return Some(SseLine::Event(event.trim()));
    }
    line.strip_prefix("data:")
        .map(|data| SseLine::Data(data.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_yields_complete_lines_only() {
        let mut buf = SseBuffer::default();
        buf.push(b"data: {\"a\":1}\r\nda");
        assert_eq!(buf.next_line().as_deref(), Some("data: {\"a\":1}"));
        assert!(buf.next_line().is_none());

        buf.push(b"ta: [DONE]\n");
        assert_eq!(buf.next_line().as_deref(), Some("data: [DONE]"));
    }

    #[test]
    fn buffer_reassembles_split_utf8() {
        let bytes = "data: héllo\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut buf = SseBuffer::default();
        buf.push(&bytes[..split]);
        assert!(buf.next_line().is_none());
        buf.push(&bytes[split..]);
        assert_eq!(buf.next_line().as_deref(), Some("data: héllo"));
    }

    #[test]
    fn classify_lines() {
        assert_eq!(classify(""), None);
        assert_eq!(classify(": keep-alive"), None);
        assert_eq!(classify("event: message_stop"), Some(SseLine::Event("message_stop")));
        assert_eq!(classify("data: [DONE]"), Some(SseLine::Data("[DONE]")));
        assert_eq!(classify("data:{}"), Some(SseLine::Data("{}")));
        assert_eq!(classify("id: 7"), None);
    }
}
