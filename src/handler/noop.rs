//! Stateless verbs: NOOP, and the ones this server refuses to implement.

use super::{CommandHandler, CommandTimer};
use crate::command::Command;
use crate::response::Response;
use crate::session::Session;

pub(crate) struct NoopCommand;

impl CommandHandler for NoopCommand {
    fn verbs(&self) -> &'static [&'static str] {
        &["NOOP"]
    }

    fn on_command(&self, _session: &mut Session, command: &Command) -> Response {
        let _timer = CommandTimer::start(command.verb());
        Response::new(250, "2.0.0 OK")
    }
}

/// VRFY, EXPN and HELP are always refused.
pub(crate) struct UnsupportedCommand;

impl CommandHandler for UnsupportedCommand {
    fn verbs(&self) -> &'static [&'static str] {
        &["VRFY", "EXPN", "HELP"]
    }

    fn on_command(&self, _session: &mut Session, command: &Command) -> Response {
        let _timer = CommandTimer::start(command.verb());
        Response::new(502, format!("5.3.3 {} is not supported", command.verb()))
    }
}
