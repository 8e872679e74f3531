//! Minimal response sink for serving encoded images.
//!
//! Headers must be settled before the first body byte, exactly like an HTTP
//! response writer. [`BufferedResponse`] enforces that ordering and is what
//! the CLI and the tests render into; an HTTP layer would implement
//! [`ResponseWriter`] over its own response type.

use std::io;
use tracing::warn;

pub trait ResponseWriter {
    /// Set or replace a header. Ignored once the body has started.
    fn set_header(&mut self, name: &str, value: &str);

    /// Append bytes to the body.
    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// In-memory response.
#[derive(Debug, Default)]
pub struct BufferedResponse {
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    body_started: bool,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

impl ResponseWriter for BufferedResponse {
    fn set_header(&mut self, name: &str, value: &str) {
        if self.body_started {
            warn!(header = name, "header set after body started; ignored");
            return;
        }
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.body_started = true;
        self.body.extend_from_slice(bytes);
        Ok(())
    }
}
