use crate::address::MailAddress;
use crate::hook::{HookResult, RcptHook};
use crate::session::Session;

/// Checks that local senders are who they authenticated as.
#[derive(Debug, Default, Clone, Copy)]
pub struct SenderAuthVerification;

impl SenderAuthVerification {
    fn is_local(session: &Session, sender: &MailAddress) -> bool {
        !sender.is_null_sender() && session.config().is_local_domain(sender.domain())
    }

    /// The name a local sender must have authenticated with.
    fn identity(session: &Session, sender: &MailAddress) -> String {
        match session.config().use_virtual_hosting {
            true => sender.to_string(),
            false => sender.local_part().to_string(),
        }
    }
}

impl RcptHook for SenderAuthVerification {
    fn do_rcpt(
        &self,
        session: &mut Session,
        sender: &MailAddress,
        _recipient: &MailAddress,
    ) -> HookResult {
        let Some(user) = session.user() else {
            if Self::is_local(session, sender) {
                log::warn!(
                    "Unauthenticated session {} claims local sender <{sender}>",
                    session.id()
                );
                return HookResult::deny()
                    .with_reply(530, "5.7.0 Authentication required to send as a local address");
            }
            return HookResult::declined();
        };

        let mismatch = sender.is_null_sender()
            || (Self::is_local(session, sender)
                && !Self::identity(session, sender).eq_ignore_ascii_case(user));
        if mismatch {
            log::warn!("User {user} may not send as <{sender}>");
            return HookResult::deny()
                .with_reply(503, "5.7.1 Incorrect Authentication for Specified Email Address");
        }
        HookResult::declined()
    }
}
