#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::correctness,
    missing_debug_implementations,
    clippy::all,
    clippy::wildcard_imports,
    clippy::needless_borrow,
    clippy::cast_lossless,
    clippy::unused_async,
    clippy::explicit_iter_loop,
    clippy::explicit_into_iter_loop,
    clippy::cloned_instead_of_copied
)]
#![cfg_attr(not(test), forbid(clippy::indexing_slicing))]
#![cfg_attr(not(test), forbid(clippy::string_slice))]
#![allow(
    clippy::match_bool,
    clippy::mixed_read_write_in_expression,
    clippy::bool_assert_comparison,
    clippy::manual_split_once,
    clippy::format_push_string,
    clippy::bool_to_int_with_if
)]
pub mod address;
pub mod command;
pub mod config;
pub mod data;
pub mod error;
pub(crate) mod handler;
pub mod hook;
pub mod hooks;
pub mod protocol;
pub mod response;
pub mod server;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use handler::CommandHandler;
pub use protocol::{ProtocolBuilder, SmtpProtocol};
