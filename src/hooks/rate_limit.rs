use crate::address::MailAddress;
use crate::hook::{HookResult, MailHook};
use crate::session::Session;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::fmt;
use std::num::NonZeroU32;

/// Limits how many transactions one sender may open per minute.
pub struct SenderRateLimit {
    limiter: DefaultKeyedRateLimiter<String>,
}

impl SenderRateLimit {
    pub fn new(max_per_minute: NonZeroU32) -> Self {
        Self {
            limiter: RateLimiter::keyed(Quota::per_minute(max_per_minute)),
        }
    }
}

impl fmt::Debug for SenderRateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderRateLimit")
            .field("tracked_senders", &self.limiter.len())
            .finish()
    }
}

impl MailHook for SenderRateLimit {
    fn do_mail(&self, _session: &mut Session, sender: &MailAddress) -> HookResult {
        // Bounces must always get through.
        if sender.is_null_sender() {
            return HookResult::declined();
        }

        let key = sender.to_string().to_ascii_lowercase();
        if let Err(e) = self.limiter.check_key(&key) {
            // "<example@example.org> rate limited until: ..."
            log::debug!("<{sender}> {e}");
            return HookResult::deny_soft()
                .with_reply(450, format!("4.7.1 Too much mail from <{sender}>, {e}"));
        }

        // Only called after a successful check, so one sender flooding us
        // does not trigger the O(senders) sweep on every attempt.
        self.limiter.retain_recent();
        HookResult::declined()
    }
}
