//! MAIL FROM.

use super::{HookableCommand, path_argument, split_options, strip_brackets};
use crate::address::MailAddress;
use crate::command::Command;
use crate::hook::{COMMAND_DEFAULTS, HookResponse, HookResult, MailHook, MailParametersHook};
use crate::response::Response;
use crate::session::{PENDING_SENDER, SENDER, Scope, Session};
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) struct MailCommand {
    hooks: Vec<Arc<dyn MailHook>>,
    parameter_hooks: HashMap<&'static str, Arc<dyn MailParametersHook>>,
}

impl MailCommand {
    pub(crate) fn new(
        hooks: Vec<Arc<dyn MailHook>>,
        parameter_hooks: Vec<Arc<dyn MailParametersHook>>,
    ) -> Self {
        let mut by_name = HashMap::new();
        for hook in parameter_hooks {
            for name in hook.parameter_names() {
                // The first hook registered for a name keeps it.
                by_name.entry(*name).or_insert_with(|| hook.clone());
            }
        }
        Self {
            hooks,
            parameter_hooks: by_name,
        }
    }

    /// Dispatch `NAME=value` options; the first reply from a hook wins.
    fn handle_parameters(&self, session: &mut Session, options: &str) -> Option<Response> {
        for option in options.split(' ').filter(|option| !option.is_empty()) {
            let (name, value) = option.split_once('=').unwrap_or((option, ""));
            let name = name.to_ascii_uppercase();
            let Some(hook) = self.parameter_hooks.get(name.as_str()) else {
                log::warn!("Ignoring unsupported MAIL parameter {name}");
                continue;
            };
            let result = hook.do_mail_parameter(session, &name, value);
            if let HookResponse::Reply(response) = result.to_response(&COMMAND_DEFAULTS) {
                return Some(response);
            }
        }
        None
    }
}

impl HookableCommand for MailCommand {
    type Hook = dyn MailHook;

    fn verbs(&self) -> &'static [&'static str] {
        &["MAIL"]
    }

    fn hooks(&self) -> &[Arc<Self::Hook>] {
        &self.hooks
    }

    fn filter_checks(&self, session: &mut Session, command: &Command) -> Option<Response> {
        let Some(path) = path_argument(command.argument(), "FROM") else {
            return Some(Response::new(501, "5.5.4 Usage: MAIL FROM:<sender>"));
        };
        if session.sender().is_some() {
            return Some(Response::new(503, "5.5.0 Sender already specified"));
        }
        if session.config().helo_ehlo_enforcement && session.helo_mode().is_none() {
            return Some(Response::new(503, "5.5.1 Need HELO or EHLO before MAIL"));
        }

        // Leftovers of earlier commands do not belong to the new transaction.
        session.reset_transaction();

        let config = session.config();
        let (path, options) = split_options(path);
        let Some(address) = strip_brackets(path, config.address_bracket_enforcement) else {
            return Some(Response::new(501, "5.1.7 Syntax error in MAIL command"));
        };
        let sender = match address.is_empty() {
            true => MailAddress::null_sender(),
            false => match MailAddress::parse_with_default_domain(address, &config.default_domain)
            {
                Ok(sender) => sender,
                Err(e) => {
                    log::debug!("Rejecting sender in session {}: {e}", session.id());
                    return Some(Response::new(501, "5.1.7 Syntax error in sender address"));
                }
            },
        };

        if let Some(options) = options
            && let Some(response) = self.handle_parameters(session, options)
        {
            return Some(response);
        }

        session.set(Scope::Transaction, &PENDING_SENDER, sender);
        None
    }

    fn call_hook(&self, hook: &Self::Hook, session: &mut Session, _command: &Command) -> HookResult {
        match session.get(Scope::Transaction, &PENDING_SENDER).cloned() {
            Some(sender) => hook.do_mail(session, &sender),
            None => HookResult::declined(),
        }
    }

    fn core_logic(&self, session: &mut Session, _command: &Command) -> Response {
        let Some(sender) = session.remove(Scope::Transaction, &PENDING_SENDER) else {
            return Response::new(501, "5.1.7 Syntax error in sender address");
        };
        let response = Response::new(250, format!("2.1.0 Sender <{sender}> OK"));
        session.set(Scope::Transaction, &SENDER, sender);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::data::size::MessageSizeLimit;
    use crate::handler::{CommandHandler, Hookable};
    use crate::session::{HELO_MODE, HeloMode, UNKNOWN_COMMAND};
    use crate::testing::{StaticHook, address, config, session, session_with};
    use rstest::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use testresult::TestResult;

    fn mail(hooks: Vec<Arc<dyn MailHook>>) -> Hookable<MailCommand> {
        Hookable(MailCommand::new(
            hooks,
            vec![Arc::new(MessageSizeLimit::new(1000))],
        ))
    }

    fn greeted() -> Session {
        let mut session = session();
        session.set(Scope::Connection, &HELO_MODE, HeloMode::Ehlo);
        session
    }

    #[rstest]
    #[case("MAIL FROM:<a@x.com>", 250, Some("a@x.com"))]
    #[case("MAIL from: <a@x.com>", 250, Some("a@x.com"))]
    #[case("MAIL FROM:<>", 250, Some(""))]
    #[case("MAIL FROM:<postmaster>", 250, Some("postmaster@example.org"))]
    #[case("MAIL FROM:<a@x.com> SIZE=500", 250, Some("a@x.com"))]
    #[case("MAIL FROM:<a@x.com> SIZE=5000", 552, None)]
    #[case("MAIL FROM:<a@x.com> size=big", 501, None)]
    #[case("MAIL FROM:<a@x.com> BODY=8BITMIME", 250, Some("a@x.com"))]
    #[case("MAIL FROM:a@x.com", 501, None)]
    #[case("MAIL FROM:<a b@x.com>", 501, None)]
    #[case("MAIL TO:<a@x.com>", 501, None)]
    #[case("MAIL", 501, None)]
    fn test_mail_from(
        #[case] line: &str,
        #[case] code: u16,
        #[case] sender: Option<&str>,
    ) {
        let mut session = greeted();
        let response = mail(vec![]).on_command(&mut session, &Command::parse(line));

        assert_eq!(response.code(), code);
        assert_eq!(session.sender().map(ToString::to_string).as_deref(), sender);
    }

    #[test]
    fn test_reply_text() {
        let mut session = greeted();
        let response = mail(vec![]).on_command(&mut session, &Command::parse("MAIL FROM:<a@x.com>"));
        assert_eq!(response.text(), "2.1.0 Sender <a@x.com> OK");
    }

    /// Counts the senders it is asked about.
    #[derive(Default)]
    struct CountingHook(AtomicUsize);

    impl MailHook for CountingHook {
        fn do_mail(&self, _session: &mut Session, _sender: &MailAddress) -> HookResult {
            self.0.fetch_add(1, Ordering::Relaxed);
            HookResult::declined()
        }
    }

    #[test]
    fn test_second_mail_is_rejected() -> TestResult {
        let mut session = greeted();
        let counter = Arc::new(CountingHook::default());
        let handler = mail(vec![counter.clone()]);
        handler.on_command(&mut session, &Command::parse("MAIL FROM:<a@x.com>"));
        assert_eq!(counter.0.load(Ordering::Relaxed), 1);

        let response = handler.on_command(&mut session, &Command::parse("MAIL FROM:<b@x.com>"));

        assert_eq!(response.code(), 503);
        assert_eq!(response.text(), "5.5.0 Sender already specified");
        assert_eq!(session.sender(), Some(&address("a@x.com")?));
        assert_eq!(counter.0.load(Ordering::Relaxed), 1);
        Ok(())
    }

    #[test]
    fn test_new_transaction_drops_leftovers() -> TestResult {
        let mut session = greeted();
        session.set(Scope::Transaction, &UNKNOWN_COMMAND, "XFOO".to_string());

        let response = mail(vec![]).on_command(&mut session, &Command::parse("MAIL FROM:<a@x.com>"));

        assert_eq!(response.code(), 250);
        assert!(session.get(Scope::Transaction, &UNKNOWN_COMMAND).is_none());
        assert_eq!(session.sender(), Some(&address("a@x.com")?));
        Ok(())
    }

    #[test]
    fn test_helo_required() {
        let mut session = session();
        let response = mail(vec![]).on_command(&mut session, &Command::parse("MAIL FROM:<a@x.com>"));

        assert_eq!(response.code(), 503);
        assert_eq!(response.text(), "5.5.1 Need HELO or EHLO before MAIL");
    }

    #[test]
    fn test_relaxed_config_accepts_bare_path_without_helo() {
        let mut session = session_with(Config {
            helo_ehlo_enforcement: false,
            address_bracket_enforcement: false,
            ..config()
        });
        let response = mail(vec![]).on_command(&mut session, &Command::parse("MAIL FROM:a@x.com"));

        assert_eq!(response.code(), 250);
        assert_eq!(session.sender().map(ToString::to_string).as_deref(), Some("a@x.com"));
    }

    #[test]
    fn test_denying_hook_leaves_no_sender() {
        let mut session = greeted();
        let response = mail(vec![Arc::new(StaticHook(
            HookResult::deny().with_reply(550, "5.7.1 Sender blocked"),
        ))])
        .on_command(&mut session, &Command::parse("MAIL FROM:<a@x.com>"));

        assert_eq!(response.code(), 550);
        assert!(session.sender().is_none());
    }
}
