//! `Received:` trace header injection.

use super::{DataLineFilter, LineOutcome, Next};
use crate::session::{AttachmentKey, HeloMode, Scope, Session};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Continuation lines are folded with this indent.
const FOLD: &str = "          ";

static FILTER_IDS: AtomicUsize = AtomicUsize::new(0);

/// Where the header is injected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    /// Before the first header line of the message.
    #[default]
    Prefix,
    /// After the last header line, right before the separator.
    Suffix,
}

/// Adds a `Received:` header (RFC 5321 section 4.4) to every message.
#[derive(Debug)]
pub struct ReceivedHeaderFilter {
    location: Location,
    injected: AttachmentKey<bool>,
}

impl ReceivedHeaderFilter {
    pub fn new(location: Location) -> Self {
        let id = FILTER_IDS.fetch_add(1, Ordering::Relaxed);
        Self {
            location,
            injected: AttachmentKey::owned(format!("smtp.received_header.{id}")),
        }
    }

    /// The header as folded lines, without line delimiters.
    pub fn header_lines(&self, session: &Session) -> Vec<String> {
        let mut lines = Vec::with_capacity(4);

        let helo = match (session.helo_mode(), session.helo_name()) {
            (Some(mode), Some(name)) => format!(" ({mode} {name})"),
            _ => String::new(),
        };
        lines.push(format!(
            "Received: from {}{} ([{}])",
            session.remote_host(),
            helo,
            session.remote_addr().ip()
        ));

        if let Some(tls) = session.tls() {
            lines.push(format!(
                "{FOLD}(using {} with cipher {})",
                tls.protocol,
                tls.cipher.as_deref().unwrap_or_default()
            ));
        }

        let config = session.config();
        let mut by = format!(
            "{FOLD}by {} ({}) with {} ID {}",
            config.hostname,
            config.software_name,
            service_type(session),
            session.id()
        );
        // Only a single recipient is named.
        match session.recipients() {
            [recipient] => by.push_str(&format!(" for <{recipient}>;")),
            _ => by.push(';'),
        }
        lines.push(by);

        lines.push(format!("{FOLD}{}", chrono::Local::now().to_rfc2822()));
        lines
    }

    fn inject(&self, session: &mut Session, next: &mut Next<'_>) {
        if session
            .get(Scope::Transaction, &self.injected)
            .copied()
            .unwrap_or(false)
        {
            return;
        }
        session.set(Scope::Transaction, &self.injected, true);
        for line in self.header_lines(session) {
            next.header(session, format!("{line}\r\n").as_bytes());
        }
    }
}

/// RFC 3848 transmission type.
fn service_type(session: &Session) -> &'static str {
    if session.helo_mode() != Some(HeloMode::Ehlo) {
        return "SMTP";
    }
    match (session.is_authenticated(), session.is_tls_active()) {
        (false, false) => "ESMTP",
        (true, false) => "ESMTPA",
        (false, true) => "ESMTPS",
        (true, true) => "ESMTPSA",
    }
}

impl DataLineFilter for ReceivedHeaderFilter {
    fn on_header_line(&self, session: &mut Session, line: &[u8], next: &mut Next<'_>) -> LineOutcome {
        if self.location == Location::Prefix {
            self.inject(session, next);
        }
        next.header(session, line)
    }

    fn on_separator_line(
        &self,
        session: &mut Session,
        line: &[u8],
        next: &mut Next<'_>,
    ) -> LineOutcome {
        if self.location == Location::Suffix {
            self.inject(session, next);
        }
        next.separator(session, line)
    }
}
