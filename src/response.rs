//! SMTP replies produced by the engine.

use std::fmt;

/// A complete SMTP reply: status code, one or more text lines and whether the
/// session ends once it has been written.
///
/// Responses are plain values. Shared defaults are built fresh by the
/// constructor functions below instead of being mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    code: u16,
    lines: Vec<String>,
    end_session: bool,
}

impl Response {
    /// Single-line reply.
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![text.into()],
            end_session: false,
        }
    }

    /// Reply without any text that only closes the session.
    ///
    /// Nothing is written to the client for it.
    pub fn disconnect() -> Self {
        Self {
            code: 0,
            lines: Vec::new(),
            end_session: true,
        }
    }

    /// Append one more text line, making this a multi-line reply.
    pub fn with_line(mut self, text: impl Into<String>) -> Self {
        self.lines.push(text.into());
        self
    }

    /// Same code and text, but the session ends after this reply.
    pub fn ending_session(mut self) -> Self {
        self.end_session = true;
        self
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// First text line, or the empty string for a [`Response::disconnect`].
    pub fn text(&self) -> &str {
        self.lines.first().map(String::as_str).unwrap_or_default()
    }

    pub fn is_end_session(&self) -> bool {
        self.end_session
    }

    /// `4xx` replies.
    pub fn is_transient_failure(&self) -> bool {
        (400..500).contains(&self.code)
    }

    /// `5xx` replies.
    pub fn is_permanent_failure(&self) -> bool {
        (500..600).contains(&self.code)
    }

    /// Wire form, every line terminated by CRLF.
    ///
    /// All lines but the last use the `code-text` continuation form.
    pub fn to_wire(&self) -> String {
        let mut wire = String::new();
        let last = self.lines.len().saturating_sub(1);
        for (idx, line) in self.lines.iter().enumerate() {
            let separator = if idx == last { ' ' } else { '-' };
            wire.push_str(&format!("{}{}{}\r\n", self.code, separator, line));
        }
        wire
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.lines.join(" / "))
    }
}
