//! Message size limit (RFC 1870 `SIZE`).
//!
//! The limit is enforced twice: against the size a client declares in
//! `MAIL FROM:<..> SIZE=n`, and against the bytes actually received.

use super::{DataLineFilter, LineOutcome, LinePart, MailEnvelope, Next, TERMINATOR};
use crate::hook::{EhloExtension, HookResult, MailParametersHook, MessageHook};
use crate::session::{AttachmentKey, Scope, Session};
use async_trait::async_trait;

const RECEIVED_BYTES: AttachmentKey<usize> = AttachmentKey::new("smtp.size.received_bytes");
const LIMIT_EXCEEDED: AttachmentKey<bool> = AttachmentKey::new("smtp.size.exceeded");

/// Enforces `max_size` bytes per message, 0 meaning no limit.
#[derive(Debug, Clone, Copy)]
pub struct MessageSizeLimit {
    max_size: usize,
}

impl MessageSizeLimit {
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }

    fn is_limited(&self) -> bool {
        self.max_size > 0
    }

    /// Count the line and report whether the message is still within the limit.
    fn account(&self, session: &mut Session, line: &[u8]) -> bool {
        if !self.is_limited() {
            return true;
        }
        if session.get(Scope::Transaction, &LIMIT_EXCEEDED).is_some() {
            return false;
        }
        let received = session
            .get(Scope::Transaction, &RECEIVED_BYTES)
            .copied()
            .unwrap_or(0)
            + line.len();
        session.set(Scope::Transaction, &RECEIVED_BYTES, received);
        if received > self.max_size {
            log::warn!(
                "Message in session {} exceeds {} bytes, discarding the rest",
                session.id(),
                self.max_size
            );
            session.set(Scope::Transaction, &LIMIT_EXCEEDED, true);
            return false;
        }
        true
    }

    fn filter(
        &self,
        session: &mut Session,
        part: LinePart,
        line: &[u8],
        next: &mut Next<'_>,
    ) -> LineOutcome {
        if line == TERMINATOR || self.account(session, line) {
            next.forward(session, part, line)
        } else {
            LineOutcome::Continue
        }
    }
}

impl EhloExtension for MessageSizeLimit {
    fn ehlo_keywords(&self, _session: &Session) -> Vec<String> {
        match self.is_limited() {
            true => vec![format!("SIZE {}", self.max_size)],
            false => Vec::new(),
        }
    }
}

impl MailParametersHook for MessageSizeLimit {
    fn parameter_names(&self) -> &[&'static str] {
        &["SIZE"]
    }

    fn do_mail_parameter(&self, _session: &mut Session, _name: &str, value: &str) -> HookResult {
        let Ok(size) = value.parse::<usize>() else {
            log::debug!("Invalid SIZE parameter: {value}");
            return HookResult::deny()
                .with_reply(501, "5.5.4 Syntactically incorrect value for SIZE parameter");
        };
        if self.is_limited() && size > self.max_size {
            log::info!(
                "Rejected message of declared size {size}, limit is {}",
                self.max_size
            );
            return HookResult::deny()
                .with_reply(552, "5.3.4 Message size exceeds fixed maximum message size");
        }
        HookResult::declined()
    }
}

impl DataLineFilter for MessageSizeLimit {
    fn on_header_line(&self, session: &mut Session, line: &[u8], next: &mut Next<'_>) -> LineOutcome {
        self.filter(session, LinePart::Header, line, next)
    }

    fn on_separator_line(
        &self,
        session: &mut Session,
        line: &[u8],
        next: &mut Next<'_>,
    ) -> LineOutcome {
        self.filter(session, LinePart::Separator, line, next)
    }

    fn on_body_line(&self, session: &mut Session, line: &[u8], next: &mut Next<'_>) -> LineOutcome {
        self.filter(session, LinePart::Body, line, next)
    }
}

#[async_trait]
impl MessageHook for MessageSizeLimit {
    async fn on_message(&self, session: &mut Session, _envelope: &MailEnvelope) -> HookResult {
        if session.get(Scope::Transaction, &LIMIT_EXCEEDED).is_some() {
            return HookResult::deny().with_reply(
                552,
                "5.3.4 Error processing message: Message size exceeds fixed maximum message size",
            );
        }
        HookResult::declined()
    }
}
