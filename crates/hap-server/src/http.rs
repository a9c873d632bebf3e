//! Minimal HTTP/1.1 framing for the accessory endpoints.
//!
//! Requests arrive either in plaintext (during pairing) or as the decrypted
//! payload of the frame codec; in both cases they are parsed from a growing
//! buffer, so [`HttpRequest::parse`] reports incomplete input as `Ok(None)`.

use std::collections::HashMap;
use std::fmt::Write as _;

use hap_core::TransportError;

/// Largest accepted header block, request line included.
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub const CONTENT_TYPE_TLV8: &str = "application/pairing+tlv8";
pub const CONTENT_TYPE_JSON: &str = "application/hap+json";

/// Parsed HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Parse one request from the front of `data`.
    ///
    /// Returns the request and the number of bytes it occupied, or `None`
    /// when more bytes are needed.
    pub fn parse(data: &[u8]) -> Result<Option<(Self, usize)>, TransportError> {
        let header_end = match data.windows(4).position(|w| w == b"\r\n\r\n") {
            Some(pos) => pos,
            None if data.len() > MAX_HEADER_BYTES => {
                return Err(malformed("header block too large"));
            }
            None => return Ok(None),
        };
        if header_end > MAX_HEADER_BYTES {
            return Err(malformed("header block too large"));
        }

        let header_str = std::str::from_utf8(&data[..header_end])
            .map_err(|_| malformed("invalid UTF-8 in headers"))?;
        let mut lines = header_str.split("\r\n");

        let request_line = lines.next().ok_or_else(|| malformed("missing request line"))?;
        let (method, target) = parse_request_line(request_line)?;
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };

        let mut headers = HashMap::new();
        for line in lines {
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| malformed(&format!("bad header line {:?}", line)))?;
            headers.insert(key.trim().to_string(), value.trim().to_string());
        }

        let content_length = match header_value(&headers, "Content-Length") {
            Some(v) => v
                .parse::<usize>()
                .map_err(|_| malformed(&format!("bad Content-Length {:?}", v)))?,
            None => 0,
        };
        if content_length > MAX_BODY_BYTES {
            return Err(malformed("body too large"));
        }

        let body_start = header_end + 4;
        let total = body_start + content_length;
        if data.len() < total {
            return Ok(None);
        }

        let request = Self {
            method: method.to_string(),
            path,
            query,
            headers,
            body: data[body_start..total].to_vec(),
        };
        Ok(Some((request, total)))
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    /// Media type without parameters.
    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
            .map(|v| v.split(';').next().unwrap_or(v).trim())
    }
}

fn parse_request_line(line: &str) -> Result<(&str, &str), TransportError> {
    let mut parts = line.split_whitespace();
    let method = parts.next().ok_or_else(|| malformed("empty request line"))?;
    let target = parts.next().ok_or_else(|| malformed("missing request target"))?;
    let version = parts.next().ok_or_else(|| malformed("missing HTTP version"))?;
    if !version.starts_with("HTTP/1.") || parts.next().is_some() {
        return Err(malformed(&format!("bad request line {:?}", line)));
    }
    Ok((method, target))
}

fn header_value<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn malformed(reason: &str) -> TransportError {
    TransportError::MalformedRequest(reason.to_string())
}

/// HTTP response under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            reason: default_reason(status).to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn no_content() -> Self {
        Self::new(204)
    }

    /// 200 with a TLV8 body.
    pub fn tlv8(body: Vec<u8>) -> Self {
        Self::ok().with_body(CONTENT_TYPE_TLV8, body)
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status).with_body(CONTENT_TYPE_JSON, value.to_string().into_bytes())
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, content_type: &str, body: Vec<u8>) -> Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case("Content-Type"));
        self.headers.push(("Content-Type".to_string(), content_type.to_string()));
        self.body = body;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to wire format. Content-Length is always emitted.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = String::new();
        let _ = write!(&mut head, "HTTP/1.1 {} {}\r\n", self.status, self.reason);
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("Content-Length") {
                continue;
            }
            let _ = write!(&mut head, "{}: {}\r\n", name, value);
        }
        let _ = write!(&mut head, "Content-Length: {}\r\n\r\n", self.body.len());

        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

fn default_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        207 => "Multi-Status",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        422 => "Unprocessable Entity",
        470 => "Connection Authorization Required",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
