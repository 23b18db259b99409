//! The DATA phase: line classification, filter chain and message hooks.
//!
//! After `354` every physical line goes through [`DataLineHandler`]. Each line
//! is classified once as header, separator or body, handed down the filter
//! chain and finally written to the [`MailEnvelope`] with dot-unstuffing. The
//! terminator line closes the envelope and runs the message hooks.

pub mod received;
pub mod size;

use crate::address::MailAddress;
use crate::hook::{HookAction, HookResponse, HookResult, MESSAGE_DEFAULTS, MessageHook};
use crate::response::Response;
use crate::session::{LineHandler, LineResult, Session};
use async_trait::async_trait;
use std::io::{self, Write};
use std::sync::Arc;

const CRLF: &[u8] = b"\r\n";
const TERMINATOR: &[u8] = b".\r\n";

/// Where a line sits in the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinePart {
    Header,
    /// The empty line between headers and body.
    Separator,
    Body,
}

/// Result of pushing one line down the filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Continue,
    /// The terminator reached the end of the chain.
    Complete,
}

/// A filter sitting in front of the message writer.
///
/// Every method defaults to forwarding the line unchanged. A filter may
/// forward additional lines (e.g. injected headers) or swallow lines.
pub trait DataLineFilter: Send + Sync {
    fn on_header_line(&self, session: &mut Session, line: &[u8], next: &mut Next<'_>) -> LineOutcome {
        next.header(session, line)
    }

    fn on_separator_line(
        &self,
        session: &mut Session,
        line: &[u8],
        next: &mut Next<'_>,
    ) -> LineOutcome {
        next.separator(session, line)
    }

    fn on_body_line(&self, session: &mut Session, line: &[u8], next: &mut Next<'_>) -> LineOutcome {
        next.body(session, line)
    }
}

/// The rest of the filter chain, ending in the message writer.
pub struct Next<'a> {
    filters: &'a [Arc<dyn DataLineFilter>],
    envelope: &'a mut MailEnvelope,
}

impl<'a> Next<'a> {
    fn new(filters: &'a [Arc<dyn DataLineFilter>], envelope: &'a mut MailEnvelope) -> Self {
        Self { filters, envelope }
    }

    pub fn forward(&mut self, session: &mut Session, part: LinePart, line: &[u8]) -> LineOutcome {
        let Some((filter, rest)) = self.filters.split_first() else {
            return write_line(session, self.envelope, line);
        };
        let mut next = Next {
            filters: rest,
            envelope: &mut *self.envelope,
        };
        match part {
            LinePart::Header => filter.on_header_line(session, line, &mut next),
            LinePart::Separator => filter.on_separator_line(session, line, &mut next),
            LinePart::Body => filter.on_body_line(session, line, &mut next),
        }
    }

    pub fn header(&mut self, session: &mut Session, line: &[u8]) -> LineOutcome {
        self.forward(session, LinePart::Header, line)
    }

    pub fn separator(&mut self, session: &mut Session, line: &[u8]) -> LineOutcome {
        self.forward(session, LinePart::Separator, line)
    }

    pub fn body(&mut self, session: &mut Session, line: &[u8]) -> LineOutcome {
        self.forward(session, LinePart::Body, line)
    }
}

/// Message bytes collected during DATA.
#[derive(Debug, Default)]
pub struct MessageBody {
    content: Vec<u8>,
    closed: bool,
}

impl MessageBody {
    /// No further writes are accepted afterwards.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Write for MessageBody {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "message body is closed",
            ));
        }
        self.content.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sender, recipients and content of the message being received.
#[derive(Debug)]
pub struct MailEnvelope {
    sender: MailAddress,
    recipients: Vec<MailAddress>,
    body: MessageBody,
    failure: Option<io::Error>,
}

impl MailEnvelope {
    pub fn new(sender: MailAddress, recipients: Vec<MailAddress>) -> Self {
        Self {
            sender,
            recipients,
            body: MessageBody::default(),
            failure: None,
        }
    }

    pub fn sender(&self) -> &MailAddress {
        &self.sender
    }

    pub fn recipients(&self) -> &[MailAddress] {
        &self.recipients
    }

    /// Raw message as stored, dot-unstuffed and with CRLF line endings.
    pub fn content(&self) -> &[u8] {
        &self.body.content
    }

    pub fn size(&self) -> usize {
        self.body.content.len()
    }
}

/// Terminal consumer of the filter chain.
fn write_line(session: &mut Session, envelope: &mut MailEnvelope, line: &[u8]) -> LineOutcome {
    if line == TERMINATOR {
        return LineOutcome::Complete;
    }
    if envelope.failure.is_some() || envelope.body.is_closed() {
        return LineOutcome::Continue;
    }

    let payload = match line.strip_prefix(b".") {
        Some(unstuffed) if unstuffed.starts_with(b".") => unstuffed,
        _ => line,
    };
    let written = envelope
        .body
        .write_all(payload)
        .and_then(|()| envelope.body.flush());
    if let Err(e) = written {
        log::error!("Failed to store message line for session {}: {e}", session.id());
        envelope.body.close();
        envelope.failure = Some(e);
        session.reset_transaction();
    }
    LineOutcome::Continue
}

/// Classify a line and update the session's header state.
fn classify(session: &mut Session, line: &[u8]) -> LinePart {
    if session.header_complete() {
        LinePart::Body
    } else if line == CRLF {
        session.set_header_complete(true);
        LinePart::Separator
    } else {
        LinePart::Header
    }
}

/// Filters and message hooks, resolved once at wiring time.
pub struct DataPipeline {
    filters: Vec<Arc<dyn DataLineFilter>>,
    message_hooks: Vec<Arc<dyn MessageHook>>,
}

impl DataPipeline {
    pub(crate) fn new(
        filters: Vec<Arc<dyn DataLineFilter>>,
        message_hooks: Vec<Arc<dyn MessageHook>>,
    ) -> Self {
        Self {
            filters,
            message_hooks,
        }
    }

    /// Run the message hooks until one decides.
    ///
    /// A message nobody explicitly accepted is denied.
    async fn run_message_hooks(&self, session: &mut Session, envelope: &MailEnvelope) -> Response {
        for hook in &self.message_hooks {
            let result = hook.on_message(session, envelope).await;
            match result.to_response(&MESSAGE_DEFAULTS) {
                HookResponse::Declined => continue,
                HookResponse::Reply(response) => {
                    log::info!(
                        "Message from <{}> rejected: {}",
                        envelope.sender(),
                        response
                    );
                    return response;
                }
                HookResponse::Proceed { disconnect } => {
                    let response = accepted_response(&result);
                    log::info!(
                        "Message from <{}> to {} recipient(s) accepted ({} bytes)",
                        envelope.sender(),
                        envelope.recipients().len(),
                        envelope.size()
                    );
                    return match disconnect {
                        true => response.ending_session(),
                        false => response,
                    };
                }
            }
        }

        log::warn!(
            "No message hook accepted the message from <{}>, denying it",
            envelope.sender()
        );
        let (code, description) = MESSAGE_DEFAULTS.deny;
        Response::new(code, description)
    }
}

fn accepted_response(result: &HookResult) -> Response {
    debug_assert_eq!(result.action(), HookAction::Ok);
    match result.reply() {
        Some((code, description)) => Response::new(code, description),
        None => Response::new(250, "2.6.0 Message received"),
    }
}

impl std::fmt::Debug for DataPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataPipeline")
            .field("filters", &self.filters.len())
            .field("message_hooks", &self.message_hooks.len())
            .finish()
    }
}

/// Line handler pushed by DATA, alive until the terminator line.
pub(crate) struct DataLineHandler {
    pipeline: Arc<DataPipeline>,
    envelope: MailEnvelope,
    line_too_long: bool,
}

impl DataLineHandler {
    pub(crate) fn new(pipeline: Arc<DataPipeline>, envelope: MailEnvelope) -> Self {
        Self {
            pipeline,
            envelope,
            line_too_long: false,
        }
    }

    async fn complete(&mut self, session: &mut Session) -> Response {
        self.envelope.body.close();
        let response = match &self.envelope.failure {
            _ if self.line_too_long => Response::new(500, "5.5.2 Line too long"),
            Some(e) => Response::new(451, format!("4.3.0 Error processing message: {e}")),
            None => {
                self.pipeline
                    .run_message_hooks(session, &self.envelope)
                    .await
            }
        };
        session.reset_transaction();
        response
    }
}

#[async_trait]
impl LineHandler for DataLineHandler {
    async fn on_line(&mut self, session: &mut Session, line: &[u8]) -> LineResult {
        let part = classify(session, line);
        let outcome =
            Next::new(&self.pipeline.filters, &mut self.envelope).forward(session, part, line);
        match outcome {
            LineOutcome::Continue => LineResult::Continue,
            LineOutcome::Complete => LineResult::Done(self.complete(session).await),
        }
    }

    /// The message is incomplete, so it is dropped and refused at the terminator.
    fn on_line_too_long(&mut self, session: &mut Session) {
        if !self.line_too_long {
            log::warn!(
                "Over-long line in message from <{}>, session {}",
                self.envelope.sender(),
                session.id()
            );
        }
        self.line_too_long = true;
        self.envelope.body.close();
        session.reset_transaction();
    }
}
