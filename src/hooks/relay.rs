use crate::address::MailAddress;
use crate::hook::{HookResult, RcptHook};
use crate::session::Session;

/// Rejects recipients outside the local domains unless the session may relay.
#[derive(Debug, Default, Clone, Copy)]
pub struct RelayPermission;

impl RcptHook for RelayPermission {
    fn do_rcpt(
        &self,
        session: &mut Session,
        _sender: &MailAddress,
        recipient: &MailAddress,
    ) -> HookResult {
        if session.is_relaying_allowed() || session.config().is_local_domain(recipient.domain()) {
            return HookResult::declined();
        }

        log::warn!(
            "Relaying to <{recipient}> denied for {} in session {}",
            session.remote_addr().ip(),
            session.id()
        );
        match session.is_auth_supported() {
            true => HookResult::deny().with_reply(530, "5.7.1 Authentication Required"),
            false => HookResult::deny()
                .with_reply(550, "5.7.1 Requested action not taken: relaying denied"),
        }
    }
}
