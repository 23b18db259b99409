//! Command handlers.
//!
//! Stateful verbs share one execution pattern: local filter checks, then the
//! wired hooks in order, then the verb's core logic. [`HookableCommand`]
//! describes the verb-specific parts and [`Hookable`] runs them.

pub(crate) mod data;
pub(crate) mod helo;
pub(crate) mod mail;
pub(crate) mod noop;
pub(crate) mod quit;
pub(crate) mod rcpt;
pub(crate) mod rset;
pub(crate) mod unknown;

use crate::command::Command;
use crate::hook::{COMMAND_DEFAULTS, HookResponse, HookResult};
use crate::response::Response;
use crate::session::Session;
use std::sync::Arc;
use std::time::Instant;

/// Handles one or more verbs.
pub trait CommandHandler: Send + Sync {
    /// Upper-case verbs routed to this handler.
    fn verbs(&self) -> &'static [&'static str];

    fn on_command(&self, session: &mut Session, command: &Command) -> Response;
}

/// The verb-specific parts of a hookable command.
pub(crate) trait HookableCommand: Send + Sync {
    type Hook: ?Sized + Send + Sync;

    fn verbs(&self) -> &'static [&'static str];

    fn hooks(&self) -> &[Arc<Self::Hook>];

    /// Sequencing and syntax checks; a response here ends processing.
    fn filter_checks(&self, session: &mut Session, command: &Command) -> Option<Response>;

    fn call_hook(&self, hook: &Self::Hook, session: &mut Session, command: &Command)
    -> HookResult;

    /// Default behavior once no hook objected.
    fn core_logic(&self, session: &mut Session, command: &Command) -> Response;
}

/// Runs a [`HookableCommand`] as a [`CommandHandler`].
pub(crate) struct Hookable<C>(pub(crate) C);

impl<C: HookableCommand> CommandHandler for Hookable<C> {
    fn verbs(&self) -> &'static [&'static str] {
        self.0.verbs()
    }

    fn on_command(&self, session: &mut Session, command: &Command) -> Response {
        let _timer = CommandTimer::start(command.verb());
        let handler = &self.0;

        if let Some(response) = handler.filter_checks(session, command) {
            return response;
        }

        let mut disconnect = false;
        for hook in handler.hooks() {
            let result = handler.call_hook(hook.as_ref(), session, command);
            match result.to_response(&COMMAND_DEFAULTS) {
                HookResponse::Declined => continue,
                HookResponse::Reply(response) => {
                    log::warn!(
                        "{} rejected by hook in session {}: {response}",
                        command.verb(),
                        session.id()
                    );
                    return response;
                }
                HookResponse::Proceed { disconnect: requested } => {
                    disconnect = requested;
                    break;
                }
            }
        }

        let response = handler.core_logic(session, command);
        match disconnect {
            true => response.ending_session(),
            false => response,
        }
    }
}

/// Logs how long a command took, on every exit path.
pub(crate) struct CommandTimer {
    verb: String,
    started: Instant,
}

impl CommandTimer {
    pub(crate) fn start(verb: &str) -> Self {
        Self {
            verb: verb.to_string(),
            started: Instant::now(),
        }
    }
}

impl Drop for CommandTimer {
    fn drop(&mut self) {
        log::debug!(
            target: "smtphook::timing",
            "{} handled in {:?}",
            self.verb,
            self.started.elapsed()
        );
    }
}

/// Strip `KEYWORD:` from a MAIL or RCPT argument.
pub(crate) fn path_argument<'a>(argument: Option<&'a str>, keyword: &str) -> Option<&'a str> {
    let (found, path) = argument?.split_once(':')?;
    found
        .trim()
        .eq_ignore_ascii_case(keyword)
        .then(|| path.trim())
}

/// Split `<path> OPTION=value ...` after the closing bracket.
pub(crate) fn split_options(path: &str) -> (&str, Option<&str>) {
    if let Some(idx) = path.rfind('>') {
        let (address, rest) = path.split_at(idx + 1);
        if let Some(options) = rest.strip_prefix(' ')
            && !options.trim().is_empty()
        {
            return (address, Some(options.trim()));
        }
    }
    (path, None)
}

/// Remove the angle brackets, failing if they are required but missing.
pub(crate) fn strip_brackets(path: &str, required: bool) -> Option<&str> {
    match path.strip_prefix('<').and_then(|p| p.strip_suffix('>')) {
        Some(inner) => Some(inner.trim()),
        None if required => None,
        None => Some(path),
    }
}
