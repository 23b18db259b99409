//! RCPT TO.

use super::{HookableCommand, path_argument, split_options, strip_brackets};
use crate::address::MailAddress;
use crate::command::Command;
use crate::hook::{HookResult, RcptHook};
use crate::response::Response;
use crate::session::{CURRENT_RECIPIENT, RECIPIENTS, Scope, Session};
use std::sync::Arc;

pub(crate) struct RcptCommand {
    hooks: Vec<Arc<dyn RcptHook>>,
}

impl RcptCommand {
    pub(crate) fn new(hooks: Vec<Arc<dyn RcptHook>>) -> Self {
        Self { hooks }
    }
}

impl HookableCommand for RcptCommand {
    type Hook = dyn RcptHook;

    fn verbs(&self) -> &'static [&'static str] {
        &["RCPT"]
    }

    fn hooks(&self) -> &[Arc<Self::Hook>] {
        &self.hooks
    }

    fn filter_checks(&self, session: &mut Session, command: &Command) -> Option<Response> {
        if session.sender().is_none() {
            return Some(Response::new(503, "5.5.1 Need MAIL before RCPT"));
        }
        let Some(path) = path_argument(command.argument(), "TO") else {
            return Some(Response::new(501, "5.5.2 Usage: RCPT TO:<recipient>"));
        };

        let config = session.config();
        let (path, options) = split_options(path);
        let Some(address) = strip_brackets(path, config.address_bracket_enforcement) else {
            return Some(Response::new(501, "5.1.3 Syntax error in RCPT command"));
        };
        let recipient = match MailAddress::parse_with_default_domain(address, &config.default_domain)
        {
            Ok(recipient) => recipient,
            Err(e) => {
                log::debug!("Rejecting recipient in session {}: {e}", session.id());
                return Some(Response::new(501, "5.1.3 Syntax error in recipient address"));
            }
        };

        // No RCPT parameters (e.g. DSN NOTIFY) are implemented.
        if let Some(options) = options {
            let name = options
                .split(' ')
                .next()
                .and_then(|option| option.split('=').next())
                .unwrap_or(options);
            return Some(Response::new(
                504,
                format!("5.5.4 Recipient parameter not implemented: {name}"),
            ));
        }

        session.set(Scope::Transaction, &CURRENT_RECIPIENT, recipient);
        None
    }

    fn call_hook(&self, hook: &Self::Hook, session: &mut Session, _command: &Command) -> HookResult {
        let sender = session.sender().cloned();
        let recipient = session.get(Scope::Transaction, &CURRENT_RECIPIENT).cloned();
        match (sender, recipient) {
            (Some(sender), Some(recipient)) => hook.do_rcpt(session, &sender, &recipient),
            _ => HookResult::declined(),
        }
    }

    fn core_logic(&self, session: &mut Session, _command: &Command) -> Response {
        let Some(recipient) = session.remove(Scope::Transaction, &CURRENT_RECIPIENT) else {
            return Response::new(501, "5.1.3 Syntax error in recipient address");
        };
        let response = Response::new(250, format!("2.1.5 Recipient <{recipient}> OK"));
        match session.get_mut(Scope::Transaction, &RECIPIENTS) {
            Some(recipients) => recipients.push(recipient),
            None => session.set(Scope::Transaction, &RECIPIENTS, vec![recipient]),
        }
        response
    }
}
