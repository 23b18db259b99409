//! DATA: switches the session into message receiving mode.

use super::{CommandHandler, CommandTimer};
use crate::command::Command;
use crate::data::{DataLineHandler, DataPipeline, MailEnvelope};
use crate::response::Response;
use crate::session::Session;
use std::sync::Arc;

pub(crate) struct DataCommand {
    pipeline: Arc<DataPipeline>,
}

impl DataCommand {
    pub(crate) fn new(pipeline: Arc<DataPipeline>) -> Self {
        Self { pipeline }
    }
}

impl CommandHandler for DataCommand {
    fn verbs(&self) -> &'static [&'static str] {
        &["DATA"]
    }

    fn on_command(&self, session: &mut Session, command: &Command) -> Response {
        let _timer = CommandTimer::start(command.verb());

        if command.argument().is_some() {
            return Response::new(501, "5.5.4 Unexpected argument provided with DATA command");
        }
        let Some(sender) = session.sender().cloned() else {
            return Response::new(503, "5.5.1 No mail sender specified");
        };
        if session.recipients().is_empty() {
            return Response::new(503, "5.5.1 No recipients specified");
        }

        let envelope = MailEnvelope::new(sender, session.recipients().to_vec());
        session.set_header_complete(false);
        session.push_line_handler(Box::new(DataLineHandler::new(
            self.pipeline.clone(),
            envelope,
        )));
        Response::new(354, "Ok Send data ending with <CRLF>.<CRLF>")
    }
}
