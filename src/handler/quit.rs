use super::HookableCommand;
use crate::command::Command;
use crate::hook::{HookResult, QuitHook};
use crate::response::Response;
use crate::session::Session;
use std::sync::Arc;

/// QUIT, ending the session.
pub(crate) struct QuitCommand {
    hooks: Vec<Arc<dyn QuitHook>>,
}

impl QuitCommand {
    pub(crate) fn new(hooks: Vec<Arc<dyn QuitHook>>) -> Self {
        Self { hooks }
    }
}

impl HookableCommand for QuitCommand {
    type Hook = dyn QuitHook;

    fn verbs(&self) -> &'static [&'static str] {
        &["QUIT"]
    }

    fn hooks(&self) -> &[Arc<Self::Hook>] {
        &self.hooks
    }

    fn filter_checks(&self, _session: &mut Session, command: &Command) -> Option<Response> {
        command.argument().map(|_| {
            Response::new(501, "5.5.4 Unexpected argument provided with QUIT command")
        })
    }

    fn call_hook(&self, hook: &Self::Hook, session: &mut Session, _command: &Command) -> HookResult {
        hook.do_quit(session)
    }

    fn core_logic(&self, session: &mut Session, _command: &Command) -> Response {
        Response::new(
            221,
            format!(
                "2.0.0 {} Service closing transmission channel",
                session.config().hostname
            ),
        )
        .ending_session()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{CommandHandler, Hookable};
    use crate::testing::{StaticHook, session};

    #[test]
    fn test_quit_ends_session() {
        let response = Hookable(QuitCommand::new(vec![]))
            .on_command(&mut session(), &Command::parse("QUIT"));

        assert_eq!(response.code(), 221);
        assert_eq!(
            response.text(),
            "2.0.0 mx.example.org Service closing transmission channel"
        );
        assert!(response.is_end_session());
    }

    #[test]
    fn test_quit_with_argument() {
        let response = Hookable(QuitCommand::new(vec![]))
            .on_command(&mut session(), &Command::parse("QUIT please"));

        assert_eq!(response.code(), 501);
        assert!(!response.is_end_session());
    }

    #[test]
    fn test_denying_hook_replaces_goodbye() {
        let response = Hookable(QuitCommand::new(vec![Arc::new(StaticHook(
            HookResult::deny_soft(),
        ))]))
        .on_command(&mut session(), &Command::parse("QUIT"));

        assert_eq!(response.code(), 451);
        assert!(!response.is_end_session());
    }
}
