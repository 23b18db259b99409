//! Wiring of handlers and hooks, and the per-line entry point.

use crate::command::Command;
use crate::data::size::MessageSizeLimit;
use crate::data::{DataLineFilter, DataPipeline};
use crate::error::Error;
use crate::handler::data::DataCommand;
use crate::handler::helo::HeloCommand;
use crate::handler::mail::MailCommand;
use crate::handler::noop::{NoopCommand, UnsupportedCommand};
use crate::handler::quit::QuitCommand;
use crate::handler::rcpt::RcptCommand;
use crate::handler::rset::RsetCommand;
use crate::handler::unknown::UnknownCommand;
use crate::handler::{CommandHandler, Hookable};
use crate::hook::{
    EhloExtension, HeloHook, MailHook, MailParametersHook, MessageHook, QuitHook, RcptHook,
    UnknownHook,
};
use crate::response::Response;
use crate::session::{LineResult, Session};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Collects hooks in registration order; [`ProtocolBuilder::build`] freezes them.
#[derive(Default)]
pub struct ProtocolBuilder {
    helo_hooks: Vec<Arc<dyn HeloHook>>,
    mail_hooks: Vec<Arc<dyn MailHook>>,
    mail_parameter_hooks: Vec<Arc<dyn MailParametersHook>>,
    rcpt_hooks: Vec<Arc<dyn RcptHook>>,
    quit_hooks: Vec<Arc<dyn QuitHook>>,
    unknown_hooks: Vec<Arc<dyn UnknownHook>>,
    ehlo_extensions: Vec<Arc<dyn EhloExtension>>,
    line_filters: Vec<Arc<dyn DataLineFilter>>,
    message_hooks: Vec<Arc<dyn MessageHook>>,
    command_handlers: Vec<Arc<dyn CommandHandler>>,
}

impl ProtocolBuilder {
    pub fn helo_hook(mut self, hook: Arc<dyn HeloHook>) -> Self {
        self.helo_hooks.push(hook);
        self
    }

    pub fn mail_hook(mut self, hook: Arc<dyn MailHook>) -> Self {
        self.mail_hooks.push(hook);
        self
    }

    pub fn mail_parameters_hook(mut self, hook: Arc<dyn MailParametersHook>) -> Self {
        self.mail_parameter_hooks.push(hook);
        self
    }

    pub fn rcpt_hook(mut self, hook: Arc<dyn RcptHook>) -> Self {
        self.rcpt_hooks.push(hook);
        self
    }

    pub fn quit_hook(mut self, hook: Arc<dyn QuitHook>) -> Self {
        self.quit_hooks.push(hook);
        self
    }

    pub fn unknown_hook(mut self, hook: Arc<dyn UnknownHook>) -> Self {
        self.unknown_hooks.push(hook);
        self
    }

    pub fn ehlo_extension(mut self, extension: Arc<dyn EhloExtension>) -> Self {
        self.ehlo_extensions.push(extension);
        self
    }

    /// Filters see DATA lines in registration order.
    pub fn data_line_filter(mut self, filter: Arc<dyn DataLineFilter>) -> Self {
        self.line_filters.push(filter);
        self
    }

    pub fn message_hook(mut self, hook: Arc<dyn MessageHook>) -> Self {
        self.message_hooks.push(hook);
        self
    }

    /// Handle additional verbs, or replace a built-in handler.
    pub fn command_handler(mut self, handler: Arc<dyn CommandHandler>) -> Self {
        self.command_handlers.push(handler);
        self
    }

    /// Wire `limit` in all of its roles.
    ///
    /// Its line filter counts bytes before any other filter and its message
    /// hook runs first, so oversized messages never reach later hooks.
    pub fn message_size_limit(mut self, limit: MessageSizeLimit) -> Self {
        let limit = Arc::new(limit);
        self.ehlo_extensions.push(limit.clone());
        self.mail_parameter_hooks.push(limit.clone());
        self.line_filters.insert(0, limit.clone());
        self.message_hooks.insert(0, limit);
        self
    }

    pub fn build(self) -> Result<SmtpProtocol, Error> {
        if self.message_hooks.is_empty() {
            return Err(Error::MissingHooks("message"));
        }

        let pipeline = Arc::new(DataPipeline::new(self.line_filters, self.message_hooks));
        let builtin: Vec<Arc<dyn CommandHandler>> = vec![
            Arc::new(Hookable(HeloCommand::new(
                self.helo_hooks,
                self.ehlo_extensions,
            ))),
            Arc::new(Hookable(MailCommand::new(
                self.mail_hooks,
                self.mail_parameter_hooks,
            ))),
            Arc::new(Hookable(RcptCommand::new(self.rcpt_hooks))),
            Arc::new(DataCommand::new(pipeline)),
            Arc::new(RsetCommand),
            Arc::new(Hookable(QuitCommand::new(self.quit_hooks))),
            Arc::new(NoopCommand),
            Arc::new(UnsupportedCommand),
        ];

        let mut handlers = HashMap::new();
        for handler in builtin.into_iter().chain(self.command_handlers) {
            for verb in handler.verbs() {
                handlers.insert(*verb, handler.clone());
            }
        }

        Ok(SmtpProtocol {
            handlers,
            unknown: Hookable(UnknownCommand::new(self.unknown_hooks)),
        })
    }
}

impl fmt::Debug for ProtocolBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolBuilder")
            .field("message_hooks", &self.message_hooks.len())
            .field("line_filters", &self.line_filters.len())
            .finish_non_exhaustive()
    }
}

/// The SMTP state machine shared by all sessions.
pub struct SmtpProtocol {
    handlers: HashMap<&'static str, Arc<dyn CommandHandler>>,
    unknown: Hookable<UnknownCommand>,
}

impl SmtpProtocol {
    pub fn builder() -> ProtocolBuilder {
        ProtocolBuilder::default()
    }

    /// Process one input line including its CRLF.
    ///
    /// Returns `None` while a line handler keeps consuming input without
    /// answering, e.g. for every DATA line but the terminator.
    pub async fn on_line(&self, session: &mut Session, line: &[u8]) -> Option<Response> {
        if let Some(mut handler) = session.pop_line_handler() {
            return match handler.on_line(session, line).await {
                LineResult::Continue => {
                    session.push_line_handler(handler);
                    None
                }
                LineResult::Done(response) => Some(response),
            };
        }
        Some(self.on_command(session, line))
    }

    /// Report an input line the transport dropped for exceeding its limit.
    ///
    /// An active line handler is told and answers later, otherwise the line
    /// is refused right away.
    pub fn on_line_too_long(&self, session: &mut Session) -> Option<Response> {
        if let Some(mut handler) = session.pop_line_handler() {
            handler.on_line_too_long(session);
            session.push_line_handler(handler);
            return None;
        }
        log::warn!("Session {} sent an over-long command line", session.id());
        Some(Response::new(500, "5.5.2 Line too long"))
    }

    fn on_command(&self, session: &mut Session, line: &[u8]) -> Response {
        let line = String::from_utf8_lossy(line);
        let command = Command::parse(line.trim_end_matches(['\r', '\n']));
        log::debug!(
            "Session {} sent {} {}",
            session.id(),
            command.verb(),
            command.argument().unwrap_or_default()
        );

        match self.handlers.get(command.verb()) {
            Some(handler) => handler.on_command(session, &command),
            None => self.unknown.on_command(session, &command),
        }
    }
}

impl fmt::Debug for SmtpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut verbs: Vec<_> = self.handlers.keys().collect();
        verbs.sort();
        f.debug_struct("SmtpProtocol").field("verbs", &verbs).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::received::{Location, ReceivedHeaderFilter};
    use crate::hook::HookResult;
    use crate::testing::{RecordingHook, StaticHook, address, session};
    use testresult::TestResult;

    struct Client {
        protocol: SmtpProtocol,
        session: Session,
    }

    impl Client {
        fn new(protocol: SmtpProtocol) -> Self {
            Self {
                protocol,
                session: session(),
            }
        }

        /// Send one line and return the reply code, if any.
        async fn send(&mut self, line: &str) -> Option<u16> {
            self.protocol
                .on_line(&mut self.session, format!("{line}\r\n").as_bytes())
                .await
                .map(|response| response.code())
        }
    }

    fn recording() -> TestResult<(SmtpProtocol, Arc<RecordingHook>)> {
        let recorder = Arc::new(RecordingHook::default());
        let protocol = SmtpProtocol::builder()
            .message_size_limit(MessageSizeLimit::new(1000))
            .data_line_filter(Arc::new(ReceivedHeaderFilter::new(Location::Prefix)))
            .message_hook(recorder.clone())
            .build()?;
        Ok((protocol, recorder))
    }

    #[test]
    fn test_build_requires_message_hook() {
        let result = SmtpProtocol::builder()
            .rcpt_hook(Arc::new(StaticHook(HookResult::declined())))
            .build();
        assert!(matches!(result, Err(Error::MissingHooks("message"))));
    }

    #[tokio::test]
    async fn test_full_transaction() -> TestResult {
        let (protocol, recorder) = recording()?;
        let mut client = Client::new(protocol);

        assert_eq!(client.send("HELO example.org").await, Some(250));
        assert_eq!(client.send("MAIL FROM:<a@x.com>").await, Some(250));
        assert_eq!(client.send("RCPT TO:<b@y.com>").await, Some(250));
        assert_eq!(client.send("DATA").await, Some(354));
        assert_eq!(client.send("From: a@x.com").await, None);
        assert_eq!(client.send("Subject: test").await, None);
        assert_eq!(client.send("").await, None);
        assert_eq!(client.send("hello").await, None);
        assert_eq!(client.send("..dot").await, None);
        assert_eq!(client.send(".").await, Some(250));

        assert!(client.session.sender().is_none());
        assert!(client.session.recipients().is_empty());
        assert!(!client.session.has_line_handler());

        let queued = recorder.queued();
        let message = String::from_utf8_lossy(queued.first().ok_or("nothing queued")?).into_owned();
        assert!(message.starts_with("Received: from 192.0.2.7 (HELO example.org) ([192.0.2.7])\r\n"));
        assert!(message.ends_with("From: a@x.com\r\nSubject: test\r\n\r\nhello\r\n.dot\r\n"));

        // The connection stays usable for the next transaction.
        assert_eq!(client.send("MAIL FROM:<c@x.com>").await, Some(250));
        Ok(())
    }

    #[tokio::test]
    async fn test_declining_message_hook_denies_and_resets() -> TestResult {
        let protocol = SmtpProtocol::builder()
            .message_hook(Arc::new(StaticHook(HookResult::declined())))
            .build()?;
        let mut client = Client::new(protocol);

        client.send("EHLO example.org").await;
        client.send("MAIL FROM:<a@x.com>").await;
        client.send("RCPT TO:<b@y.com>").await;
        client.send("DATA").await;
        client.send("Subject: x").await;
        client.send("").await;

        assert_eq!(client.send(".").await, Some(554));
        assert!(client.session.sender().is_none());
        assert!(client.session.recipients().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_sequencing_errors() -> TestResult {
        let (protocol, _) = recording()?;
        let mut client = Client::new(protocol);

        assert_eq!(client.send("MAIL FROM:<a@x.com>").await, Some(503));
        client.send("HELO example.org").await;
        assert_eq!(client.send("RCPT TO:<b@y.com>").await, Some(503));
        assert_eq!(client.send("DATA").await, Some(503));
        assert_eq!(client.send("MAIL FROM:<a@x.com>").await, Some(250));
        assert_eq!(client.send("MAIL FROM:<a@x.com>").await, Some(503));
        assert_eq!(client.send("DATA").await, Some(503));
        Ok(())
    }

    #[tokio::test]
    async fn test_rcpt_option_leaves_recipients_unchanged() -> TestResult {
        let (protocol, _) = recording()?;
        let mut client = Client::new(protocol);

        client.send("EHLO example.org").await;
        client.send("MAIL FROM:<a@x.com>").await;
        client.send("RCPT TO:<b@y.com>").await;

        assert_eq!(client.send("RCPT TO:<c@y.com> NOTIFY=SUCCESS").await, Some(504));
        assert_eq!(client.session.recipients(), [address("b@y.com")?]);
        Ok(())
    }

    #[tokio::test]
    async fn test_rset_and_misc_verbs() -> TestResult {
        let (protocol, _) = recording()?;
        let mut client = Client::new(protocol);

        client.send("EHLO example.org").await;
        client.send("MAIL FROM:<a@x.com>").await;
        assert_eq!(client.send("RSET").await, Some(250));
        assert!(client.session.sender().is_none());

        assert_eq!(client.send("noop").await, Some(250));
        assert_eq!(client.send("VRFY postmaster").await, Some(502));
        assert_eq!(client.send("STARTTLS").await, Some(500));
        Ok(())
    }

    #[tokio::test]
    async fn test_quit_ends_session() -> TestResult {
        let (protocol, _) = recording()?;
        let mut session = session();

        let response = protocol
            .on_line(&mut session, b"QUIT\r\n")
            .await
            .ok_or("QUIT must be answered")?;

        assert_eq!(response.code(), 221);
        assert!(response.is_end_session());
        Ok(())
    }

    #[tokio::test]
    async fn test_declared_size_over_limit() -> TestResult {
        let (protocol, _) = recording()?;
        let mut client = Client::new(protocol);

        client.send("EHLO example.org").await;
        assert_eq!(client.send("MAIL FROM:<a@x.com> SIZE=4096").await, Some(552));
        assert!(client.session.sender().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_custom_handler_replaces_builtin() -> TestResult {
        struct Polite;

        impl CommandHandler for Polite {
            fn verbs(&self) -> &'static [&'static str] {
                &["NOOP"]
            }

            fn on_command(&self, _session: &mut Session, _command: &Command) -> Response {
                Response::new(250, "2.0.0 Nothing to do, thank you")
            }
        }

        let protocol = SmtpProtocol::builder()
            .message_hook(Arc::new(RecordingHook::default()))
            .command_handler(Arc::new(Polite))
            .build()?;
        let response = protocol
            .on_line(&mut session(), b"NOOP\r\n")
            .await
            .ok_or("NOOP must be answered")?;

        assert_eq!(response.text(), "2.0.0 Nothing to do, thank you");
        Ok(())
    }
}
