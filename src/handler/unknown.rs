use super::HookableCommand;
use crate::command::Command;
use crate::hook::{HookResult, UnknownHook};
use crate::response::Response;
use crate::session::{Scope, Session, UNKNOWN_COMMAND};
use std::sync::Arc;

/// Fallback for verbs without a handler.
pub(crate) struct UnknownCommand {
    hooks: Vec<Arc<dyn UnknownHook>>,
}

impl UnknownCommand {
    pub(crate) fn new(hooks: Vec<Arc<dyn UnknownHook>>) -> Self {
        Self { hooks }
    }
}

impl HookableCommand for UnknownCommand {
    type Hook = dyn UnknownHook;

    fn verbs(&self) -> &'static [&'static str] {
        &[]
    }

    fn hooks(&self) -> &[Arc<Self::Hook>] {
        &self.hooks
    }

    fn filter_checks(&self, session: &mut Session, command: &Command) -> Option<Response> {
        session.set(
            Scope::Transaction,
            &UNKNOWN_COMMAND,
            command.verb().to_string(),
        );
        None
    }

    fn call_hook(&self, hook: &Self::Hook, session: &mut Session, command: &Command) -> HookResult {
        hook.do_unknown(session, command.verb())
    }

    fn core_logic(&self, _session: &mut Session, command: &Command) -> Response {
        Response::new(500, format!("5.5.1 Command {} unrecognized.", command.verb()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{CommandHandler, Hookable};
    use crate::testing::{StaticHook, session};

    #[test]
    fn test_unknown_verb() {
        let mut session = session();
        let response = Hookable(UnknownCommand::new(vec![]))
            .on_command(&mut session, &Command::parse("xyzzy magic"));

        assert_eq!(response.code(), 500);
        assert_eq!(response.text(), "5.5.1 Command XYZZY unrecognized.");
        assert_eq!(
            session.get(Scope::Transaction, &UNKNOWN_COMMAND).map(String::as_str),
            Some("XYZZY")
        );
    }

    #[test]
    fn test_hook_may_answer_unknown_verb() {
        let response = Hookable(UnknownCommand::new(vec![Arc::new(StaticHook(
            HookResult::deny().with_reply(502, "5.5.1 Go away"),
        ))]))
        .on_command(&mut session(), &Command::parse("XYZZY"));

        assert_eq!(response.code(), 502);
    }
}
