//! Per-connection session state.
//!
//! A session carries the facts negotiated by the transport (remote address,
//! TLS, authenticated user) and two attachment maps: one living as long as the
//! connection, one cleared whenever the mail transaction ends.

use crate::address::MailAddress;
use crate::config::Config;
use crate::response::Response;
use async_trait::async_trait;
use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;

/// Lifetime of an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Kept until the connection closes.
    Connection,
    /// Cleared by RSET, by the end of DATA and by a new HELO/EHLO.
    Transaction,
}

/// Name of an attachment together with the type of its value.
///
/// Hooks outside this crate should use their own, namespaced names.
pub struct AttachmentKey<T> {
    name: Cow<'static, str>,
    _value: PhantomData<fn() -> T>,
}

impl<T> AttachmentKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            _value: PhantomData,
        }
    }

    /// Key with a name computed at runtime, e.g. unique per filter instance.
    pub fn owned(name: String) -> Self {
        Self {
            name: Cow::Owned(name),
            _value: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Clone for AttachmentKey<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _value: PhantomData,
        }
    }
}

impl<T> fmt::Debug for AttachmentKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AttachmentKey").field(&self.name).finish()
    }
}

/// Which greeting verb the client used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeloMode {
    Helo,
    Ehlo,
}

impl fmt::Display for HeloMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeloMode::Helo => f.write_str("HELO"),
            HeloMode::Ehlo => f.write_str("EHLO"),
        }
    }
}

// Connection scope.
pub const HELO_MODE: AttachmentKey<HeloMode> = AttachmentKey::new("smtp.helo_mode");
pub const HELO_NAME: AttachmentKey<String> = AttachmentKey::new("smtp.helo_name");

// Transaction scope.
pub const SENDER: AttachmentKey<MailAddress> = AttachmentKey::new("smtp.sender");
/// Sender parsed by MAIL but not yet accepted by its hooks.
pub const PENDING_SENDER: AttachmentKey<MailAddress> = AttachmentKey::new("smtp.pending_sender");
pub const RECIPIENTS: AttachmentKey<Vec<MailAddress>> = AttachmentKey::new("smtp.recipients");
pub const CURRENT_RECIPIENT: AttachmentKey<MailAddress> =
    AttachmentKey::new("smtp.current_recipient");
pub const UNKNOWN_COMMAND: AttachmentKey<String> = AttachmentKey::new("smtp.unknown_command");

#[derive(Default)]
struct Attachments {
    values: HashMap<Cow<'static, str>, Box<dyn Any + Send + Sync>>,
}

impl Attachments {
    fn get<T: 'static>(&self, key: &AttachmentKey<T>) -> Option<&T> {
        self.values
            .get(key.name())
            .and_then(|value| value.downcast_ref::<T>())
    }

    fn get_mut<T: 'static>(&mut self, key: &AttachmentKey<T>) -> Option<&mut T> {
        self.values
            .get_mut(key.name())
            .and_then(|value| value.downcast_mut::<T>())
    }

    fn insert<T: Send + Sync + 'static>(&mut self, key: &AttachmentKey<T>, value: T) {
        self.values.insert(key.name.clone(), Box::new(value));
    }

    fn remove<T: 'static>(&mut self, key: &AttachmentKey<T>) -> Option<T> {
        let value = self.values.remove(key.name())?;
        value.downcast::<T>().ok().map(|value| *value)
    }
}

impl fmt::Debug for Attachments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Negotiated TLS parameters, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsInfo {
    pub protocol: String,
    pub cipher: Option<String>,
}

/// What a line handler wants after it has seen one line.
#[derive(Debug)]
pub enum LineResult {
    /// Keep routing lines to this handler, nothing to send yet.
    Continue,
    /// Remove the handler and send the response.
    Done(Response),
}

/// Intercepts raw input lines instead of the command dispatcher.
#[async_trait]
pub trait LineHandler: Send + Sync {
    /// `line` still carries its CRLF delimiter.
    async fn on_line(&mut self, session: &mut Session, line: &[u8]) -> LineResult;

    /// An input line exceeded the transport's length limit and was dropped.
    fn on_line_too_long(&mut self, _session: &mut Session) {}
}

/// State of one SMTP connection.
///
/// A session is only ever driven by one task at a time, so it needs no locking.
pub struct Session {
    id: String,
    remote_addr: SocketAddr,
    remote_host: Option<String>,
    config: Arc<Config>,
    user: Option<String>,
    tls: Option<TlsInfo>,
    header_complete: bool,
    connection: Attachments,
    transaction: Attachments,
    line_handlers: Vec<Box<dyn LineHandler>>,
}

impl Session {
    pub fn new(id: impl Into<String>, remote_addr: SocketAddr, config: Arc<Config>) -> Self {
        Self {
            id: id.into(),
            remote_addr,
            remote_host: None,
            config,
            user: None,
            tls: None,
            header_complete: false,
            connection: Attachments::default(),
            transaction: Attachments::default(),
            line_handlers: Vec::new(),
        }
    }

    /// Unique session identifier, used in trace headers.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Resolved remote host name, falling back to the IP address.
    pub fn remote_host(&self) -> String {
        match &self.remote_host {
            Some(host) => host.clone(),
            None => self.remote_addr.ip().to_string(),
        }
    }

    pub fn set_remote_host(&mut self, host: impl Into<String>) {
        self.remote_host = Some(host.into());
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Authenticated user name, if any.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn set_user(&mut self, user: impl Into<String>) {
        self.user = Some(user.into());
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Whether the session advertises authentication to the client.
    pub fn is_auth_supported(&self) -> bool {
        self.config.auth_announce
    }

    /// Relaying is permitted globally or for authenticated users.
    pub fn is_relaying_allowed(&self) -> bool {
        self.config.relaying_allowed || self.is_authenticated()
    }

    pub fn tls(&self) -> Option<&TlsInfo> {
        self.tls.as_ref()
    }

    pub fn is_tls_active(&self) -> bool {
        self.tls.is_some()
    }

    pub fn set_tls(&mut self, tls: TlsInfo) {
        self.tls = Some(tls);
    }

    /// Whether the header/body separator of the current message has been seen.
    pub fn header_complete(&self) -> bool {
        self.header_complete
    }

    pub fn set_header_complete(&mut self, complete: bool) {
        self.header_complete = complete;
    }

    fn scope(&self, scope: Scope) -> &Attachments {
        match scope {
            Scope::Connection => &self.connection,
            Scope::Transaction => &self.transaction,
        }
    }

    fn scope_mut(&mut self, scope: Scope) -> &mut Attachments {
        match scope {
            Scope::Connection => &mut self.connection,
            Scope::Transaction => &mut self.transaction,
        }
    }

    pub fn get<T: 'static>(&self, scope: Scope, key: &AttachmentKey<T>) -> Option<&T> {
        self.scope(scope).get(key)
    }

    pub fn get_mut<T: 'static>(&mut self, scope: Scope, key: &AttachmentKey<T>) -> Option<&mut T> {
        self.scope_mut(scope).get_mut(key)
    }

    pub fn set<T: Send + Sync + 'static>(&mut self, scope: Scope, key: &AttachmentKey<T>, value: T) {
        self.scope_mut(scope).insert(key, value);
    }

    pub fn remove<T: 'static>(&mut self, scope: Scope, key: &AttachmentKey<T>) -> Option<T> {
        self.scope_mut(scope).remove(key)
    }

    /// Drop everything in the transaction scope.
    pub fn reset_transaction(&mut self) {
        self.transaction = Attachments::default();
        self.header_complete = false;
    }

    pub fn sender(&self) -> Option<&MailAddress> {
        self.get(Scope::Transaction, &SENDER)
    }

    /// Recipients accepted so far in this transaction.
    pub fn recipients(&self) -> &[MailAddress] {
        self.get(Scope::Transaction, &RECIPIENTS)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn helo_mode(&self) -> Option<HeloMode> {
        self.get(Scope::Connection, &HELO_MODE).copied()
    }

    pub fn helo_name(&self) -> Option<&str> {
        self.get(Scope::Connection, &HELO_NAME).map(String::as_str)
    }

    pub fn push_line_handler(&mut self, handler: Box<dyn LineHandler>) {
        self.line_handlers.push(handler);
    }

    pub(crate) fn pop_line_handler(&mut self) -> Option<Box<dyn LineHandler>> {
        self.line_handlers.pop()
    }

    /// Whether raw lines are currently intercepted by a line handler.
    pub fn has_line_handler(&self) -> bool {
        !self.line_handlers.is_empty()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("user", &self.user)
            .field("tls", &self.tls)
            .field("header_complete", &self.header_complete)
            .field("connection", &self.connection)
            .field("transaction", &self.transaction)
            .field("line_handlers", &self.line_handlers.len())
            .finish_non_exhaustive()
    }
}
