//! Shared fixtures for unit tests.

use crate::address::MailAddress;
use crate::config::Config;
use crate::data::MailEnvelope;
use crate::hook::{
    HeloHook, HookResult, MailHook, MessageHook, QuitHook, RcptHook, UnknownHook,
};
use crate::session::Session;
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

pub(crate) const REMOTE_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7));

pub(crate) fn config() -> Config {
    Config {
        hostname: "mx.example.org".to_string(),
        software_name: "smtphook".to_string(),
        default_domain: "example.org".to_string(),
        local_domains: vec!["example.org".to_string()],
        ..Config::default()
    }
}

pub(crate) fn session_with(config: Config) -> Session {
    Session::new("test-session", SocketAddr::new(REMOTE_IP, 40000), Arc::new(config))
}

pub(crate) fn session() -> Session {
    session_with(config())
}

pub(crate) fn address(address: &str) -> Result<MailAddress, crate::error::Error> {
    MailAddress::parse(address)
}

/// Accepts every message and keeps a copy of its content.
#[derive(Debug, Default)]
pub(crate) struct RecordingHook {
    queued: Mutex<Vec<Vec<u8>>>,
}

impl RecordingHook {
    pub(crate) fn queued(&self) -> Vec<Vec<u8>> {
        self.queued.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MessageHook for RecordingHook {
    async fn on_message(&self, _session: &mut Session, envelope: &MailEnvelope) -> HookResult {
        if let Ok(mut queued) = self.queued.lock() {
            queued.push(envelope.content().to_vec());
        }
        HookResult::ok()
    }
}

/// Returns the same result for every hook type.
#[derive(Debug)]
pub(crate) struct StaticHook(pub(crate) HookResult);

impl HeloHook for StaticHook {
    fn do_helo(&self, _session: &mut Session, _helo: &str) -> HookResult {
        self.0.clone()
    }
}

impl MailHook for StaticHook {
    fn do_mail(&self, _session: &mut Session, _sender: &MailAddress) -> HookResult {
        self.0.clone()
    }
}

impl RcptHook for StaticHook {
    fn do_rcpt(
        &self,
        _session: &mut Session,
        _sender: &MailAddress,
        _recipient: &MailAddress,
    ) -> HookResult {
        self.0.clone()
    }
}

impl QuitHook for StaticHook {
    fn do_quit(&self, _session: &mut Session) -> HookResult {
        self.0.clone()
    }
}

impl UnknownHook for StaticHook {
    fn do_unknown(&self, _session: &mut Session, _command: &str) -> HookResult {
        self.0.clone()
    }
}

#[async_trait]
impl MessageHook for StaticHook {
    async fn on_message(&self, _session: &mut Session, _envelope: &MailEnvelope) -> HookResult {
        self.0.clone()
    }
}
