//! Stock hooks wired by the server binary.

mod rate_limit;
mod reinject;
mod relay;
mod sender_auth;

pub use rate_limit::SenderRateLimit;
pub use reinject::Reinject;
pub use relay::RelayPermission;
pub use sender_auth::SenderAuthVerification;
