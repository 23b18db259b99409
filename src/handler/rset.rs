use super::{CommandHandler, CommandTimer};
use crate::command::Command;
use crate::response::Response;
use crate::session::Session;

/// Aborts the current mail transaction.
pub(crate) struct RsetCommand;

impl CommandHandler for RsetCommand {
    fn verbs(&self) -> &'static [&'static str] {
        &["RSET"]
    }

    fn on_command(&self, session: &mut Session, command: &Command) -> Response {
        let _timer = CommandTimer::start(command.verb());
        if command.argument().is_some() {
            return Response::new(501, "5.5.4 Unexpected argument provided with RSET command");
        }
        session.reset_transaction();
        Response::new(250, "2.0.0 OK")
    }
}
