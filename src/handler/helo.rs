//! HELO and EHLO.

use super::HookableCommand;
use crate::command::Command;
use crate::hook::{EhloExtension, HeloHook, HookResult};
use crate::response::Response;
use crate::session::{HELO_MODE, HELO_NAME, HeloMode, Scope, Session};
use std::sync::Arc;

/// Keywords every EHLO reply carries.
const BASE_EXTENSIONS: [&str; 3] = ["PIPELINING", "ENHANCEDSTATUSCODES", "8BITMIME"];

pub(crate) struct HeloCommand {
    hooks: Vec<Arc<dyn HeloHook>>,
    extensions: Vec<Arc<dyn EhloExtension>>,
}

impl HeloCommand {
    pub(crate) fn new(
        hooks: Vec<Arc<dyn HeloHook>>,
        extensions: Vec<Arc<dyn EhloExtension>>,
    ) -> Self {
        Self { hooks, extensions }
    }
}

impl HookableCommand for HeloCommand {
    type Hook = dyn HeloHook;

    fn verbs(&self) -> &'static [&'static str] {
        &["HELO", "EHLO"]
    }

    fn hooks(&self) -> &[Arc<Self::Hook>] {
        &self.hooks
    }

    fn filter_checks(&self, session: &mut Session, command: &Command) -> Option<Response> {
        session.reset_transaction();
        match command.argument() {
            Some(_) => None,
            None => Some(Response::new(
                501,
                format!("5.5.4 Domain address required: {}", command.verb()),
            )),
        }
    }

    fn call_hook(&self, hook: &Self::Hook, session: &mut Session, command: &Command) -> HookResult {
        hook.do_helo(session, command.argument().unwrap_or_default())
    }

    fn core_logic(&self, session: &mut Session, command: &Command) -> Response {
        let domain = command.argument().unwrap_or_default().to_string();
        let mode = match command.verb() {
            "EHLO" => HeloMode::Ehlo,
            _ => HeloMode::Helo,
        };
        session.set(Scope::Connection, &HELO_MODE, mode);
        session.set(Scope::Connection, &HELO_NAME, domain.clone());

        let greeting = Response::new(
            250,
            format!(
                "{} Hello {} [{}]",
                session.config().hostname,
                domain,
                session.remote_addr().ip()
            ),
        );
        if mode == HeloMode::Helo {
            return greeting;
        }

        let extensions = self
            .extensions
            .iter()
            .flat_map(|extension| extension.ehlo_keywords(session));
        BASE_EXTENSIONS
            .iter()
            .map(|keyword| keyword.to_string())
            .chain(extensions)
            .fold(greeting, Response::with_line)
    }
}
