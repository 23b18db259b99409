//! Hands accepted messages to the next MTA.

use crate::data::MailEnvelope;
use crate::hook::{HookResult, MessageHook};
use crate::session::Session;
use async_trait::async_trait;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::fmt;

/// Relays every message over SMTP to `host:port`.
pub struct Reinject {
    target: String,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl Reinject {
    pub fn new(host: &str, port: u16) -> Self {
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .build();
        Self {
            target: format!("{host}:{port}"),
            mailer,
        }
    }
}

impl fmt::Debug for Reinject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reinject")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// The null reverse path has no lettre address and becomes `None`.
fn lettre_envelope(envelope: &MailEnvelope) -> Result<lettre::address::Envelope, String> {
    let sender = envelope.sender();
    let from = match sender.is_null_sender() {
        true => None,
        false => Some(
            sender
                .to_string()
                .parse()
                .map_err(|e| format!("Invalid from address: {e}"))?,
        ),
    };
    let to = envelope
        .recipients()
        .iter()
        .map(|addr| addr.to_string().parse())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("Invalid to address: {e}"))?;

    lettre::address::Envelope::new(from, to).map_err(|e| format!("Failed to create envelope: {e}"))
}

/// Map a downstream failure to our reply, keeping permanent codes.
fn failure_result(error: &lettre::transport::smtp::Error) -> HookResult {
    if error.is_permanent() {
        let code = error
            .status()
            .and_then(|code| code.to_string().parse().ok())
            .unwrap_or(554);
        return HookResult::deny()
            .with_reply(code, format!("5.6.0 Downstream rejected message: {error}"));
    }
    HookResult::deny_soft().with_reply(451, "4.4.1 Downstream delivery failed, try again later")
}

#[async_trait]
impl MessageHook for Reinject {
    async fn on_message(&self, session: &mut Session, envelope: &MailEnvelope) -> HookResult {
        log::debug!("Re-injecting message of session {} to {}", session.id(), self.target);

        let lettre_envelope = match lettre_envelope(envelope) {
            Ok(lettre_envelope) => lettre_envelope,
            Err(e) => {
                log::error!("Cannot re-inject message of session {}: {e}", session.id());
                return HookResult::deny_soft().with_reply(451, "4.3.0 Local error");
            }
        };

        match self.mailer.send_raw(&lettre_envelope, envelope.content()).await {
            Ok(_) => {
                log::info!(
                    "Re-injected message from <{}> for {} recipient(s) to {}",
                    envelope.sender(),
                    envelope.recipients().len(),
                    self.target
                );
                HookResult::ok()
            }
            Err(e) => {
                log::warn!("Re-injection to {} failed: {e}", self.target);
                failure_result(&e)
            }
        }
    }
}
