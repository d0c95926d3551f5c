//! # Uplink Module
//!
//! Delivery of records to the remote collectors.
//!
//! This module handles:
//! - The `UploadGateway` contract used by the sync controller
//! - An HTTP/1.1 gateway over plain TCP (see [`http`])
//! - Request payloads for the live and batch endpoints (see [`endpoint`])
//!
//! A gateway only reports how far the local transport got. `Completed` means
//! the request went out and the response was read to the end; it says nothing
//! about whether the collector accepted the payload.

pub mod endpoint;
pub mod http;

use async_trait::async_trait;
use bytes::Bytes;

/// What happened to one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Host name could not be resolved
    ResolutionFailed,
    /// No socket could be allocated
    SocketFailed,
    /// TCP connection was refused or failed
    ConnectFailed,
    /// Request could not be written to the socket
    SendFailed,
    /// Request sent and response read until the peer closed the connection
    Completed(HttpResponse),
}

impl RequestOutcome {
    /// Whether the local transport finished the exchange
    pub fn is_completed(&self) -> bool {
        matches!(self, RequestOutcome::Completed(_))
    }
}

/// Raw response collected by a gateway
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpResponse {
    /// Status code from the status line, if one could be parsed
    pub status: Option<u16>,
    /// Everything the server sent, headers included
    pub raw: Bytes,
}

impl HttpResponse {
    /// Parse the status line of a raw response
    ///
    /// # Examples
    ///
    /// ```
    /// use altimeter_sync::uplink::HttpResponse;
    ///
    /// let response = HttpResponse::parse("HTTP/1.1 201 Created\r\n\r\n{}".into());
    /// assert_eq!(response.status, Some(201));
    /// assert_eq!(response.body(), Some(&b"{}"[..]));
    /// ```
    pub fn parse(raw: Bytes) -> Self {
        let status = raw
            .split(|&b| b == b'\n')
            .next()
            .and_then(|line| std::str::from_utf8(line).ok())
            .filter(|line| line.starts_with("HTTP/"))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|code| code.parse().ok());

        Self { status, raw }
    }

    /// Response body: everything after the first blank line.
    ///
    /// Returns `None` if the end of the headers cannot be found.
    pub fn body(&self) -> Option<&[u8]> {
        let raw = &self.raw[..];
        let crlf = find(raw, b"\r\n\r\n").map(|at| at + 4);
        let lf = find(raw, b"\n\n").map(|at| at + 2);
        let start = match (crlf, lf) {
            (Some(a), Some(b)) => a.min(b),
            (a, b) => a.or(b)?,
        };
        Some(&raw[start..])
    }

    /// Whether the server answered with a 2xx status
    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(200..=299))
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Transport that performs one request/response exchange
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UploadGateway: Send + Sync {
    /// Send `request` (a complete HTTP request) to `host` and wait for the
    /// exchange to finish. Failures are reported in the outcome, never
    /// retried.
    async fn send(&self, host: &str, request: &[u8]) -> RequestOutcome;
}
