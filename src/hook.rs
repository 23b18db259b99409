//! Extension points and their uniform outcome.
//!
//! Every hook returns a [`HookResult`]. [`HookResult::to_response`] maps it to
//! what the engine does next; the same mapping serves command hooks and the
//! message hook chain, each with its own default reply table.

use crate::address::MailAddress;
use crate::data::MailEnvelope;
use crate::response::Response;
use crate::session::Session;
use async_trait::async_trait;

/// What a hook decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    /// Accept; the verb's own logic produces the reply.
    Ok,
    /// No opinion, ask the next hook.
    Declined,
    /// Permanent rejection.
    Deny,
    /// Transient rejection.
    DenySoft,
    /// No decision at all, only meaningful together with a disconnect.
    None,
}

/// Outcome of one hook invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookResult {
    action: HookAction,
    disconnect: bool,
    reply: Option<(u16, String)>,
}

impl HookResult {
    pub const fn new(action: HookAction) -> Self {
        Self {
            action,
            disconnect: false,
            reply: None,
        }
    }

    pub const fn ok() -> Self {
        Self::new(HookAction::Ok)
    }

    pub const fn declined() -> Self {
        Self::new(HookAction::Declined)
    }

    pub const fn deny() -> Self {
        Self::new(HookAction::Deny)
    }

    pub const fn deny_soft() -> Self {
        Self::new(HookAction::DenySoft)
    }

    pub const fn none() -> Self {
        Self::new(HookAction::None)
    }

    /// Use this code and description instead of the default reply.
    pub fn with_reply(mut self, code: u16, description: impl Into<String>) -> Self {
        self.reply = Some((code, description.into()));
        self
    }

    /// End the session after this result has been answered.
    pub fn disconnecting(mut self) -> Self {
        self.disconnect = true;
        self
    }

    pub fn action(&self) -> HookAction {
        self.action
    }

    pub fn is_disconnect(&self) -> bool {
        self.disconnect
    }

    pub fn reply(&self) -> Option<(u16, &str)> {
        self.reply.as_ref().map(|(code, text)| (*code, text.as_str()))
    }

    /// Map this result to the engine's next step.
    pub fn to_response(&self, defaults: &ReplyDefaults) -> HookResponse {
        match self.action {
            HookAction::Ok => HookResponse::Proceed {
                disconnect: self.disconnect,
            },
            HookAction::Deny | HookAction::DenySoft => {
                let (code, description) = match (&self.reply, self.action) {
                    (Some((code, description)), _) => (*code, description.as_str()),
                    (None, HookAction::Deny) => defaults.deny,
                    (None, _) => defaults.deny_soft,
                };
                let response = Response::new(code, description);
                HookResponse::Reply(match self.disconnect {
                    true => response.ending_session(),
                    false => response,
                })
            }
            HookAction::Declined | HookAction::None => match self.disconnect {
                true => HookResponse::Reply(Response::disconnect()),
                false => HookResponse::Declined,
            },
        }
    }
}

/// Replies used when a denying hook gives no code of its own.
#[derive(Debug, Clone, Copy)]
pub struct ReplyDefaults {
    pub deny: (u16, &'static str),
    pub deny_soft: (u16, &'static str),
}

/// Defaults for per-command hooks.
pub const COMMAND_DEFAULTS: ReplyDefaults = ReplyDefaults {
    deny: (554, "5.7.1 Email rejected"),
    deny_soft: (451, "4.7.1 Temporary problem. Please try again later"),
};

/// Defaults for the message hook chain.
pub const MESSAGE_DEFAULTS: ReplyDefaults = ReplyDefaults {
    deny: (554, "5.6.0 Transaction failed"),
    deny_soft: (451, "4.3.0 Local error"),
};

/// What the engine does after mapping a [`HookResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookResponse {
    /// Run the verb's core logic, ending the session afterwards if asked to.
    Proceed { disconnect: bool },
    /// Answer with this response right away.
    Reply(Response),
    /// Try the next hook, or the core logic if none is left.
    Declined,
}

/// Called for HELO and EHLO with the announced domain.
pub trait HeloHook: Send + Sync {
    fn do_helo(&self, session: &mut Session, helo: &str) -> HookResult;
}

/// Called for MAIL once the sender has been parsed.
pub trait MailHook: Send + Sync {
    fn do_mail(&self, session: &mut Session, sender: &MailAddress) -> HookResult;
}

/// Handles named MAIL parameters such as `SIZE=1000`.
pub trait MailParametersHook: Send + Sync {
    /// Upper-case parameter names this hook is responsible for.
    fn parameter_names(&self) -> &[&'static str];

    fn do_mail_parameter(&self, session: &mut Session, name: &str, value: &str) -> HookResult;
}

/// Called for RCPT once the recipient has been parsed.
pub trait RcptHook: Send + Sync {
    fn do_rcpt(
        &self,
        session: &mut Session,
        sender: &MailAddress,
        recipient: &MailAddress,
    ) -> HookResult;
}

pub trait QuitHook: Send + Sync {
    fn do_quit(&self, session: &mut Session) -> HookResult;
}

/// Called for verbs no handler recognizes.
pub trait UnknownHook: Send + Sync {
    fn do_unknown(&self, session: &mut Session, command: &str) -> HookResult;
}

/// Contributes keywords to the EHLO reply.
pub trait EhloExtension: Send + Sync {
    fn ehlo_keywords(&self, session: &Session) -> Vec<String>;
}

/// Decides about a complete message once DATA has ended.
#[async_trait]
pub trait MessageHook: Send + Sync {
    async fn on_message(&self, session: &mut Session, envelope: &MailEnvelope) -> HookResult;
}
