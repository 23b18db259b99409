#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::correctness,
    missing_debug_implementations,
    missing_docs,
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
//! smtphook server binary.

use env_logger::Env;
use smtphook::config::Config;
use smtphook::data::received::ReceivedHeaderFilter;
use smtphook::data::size::MessageSizeLimit;
use smtphook::error::Error;
use smtphook::hooks::{Reinject, RelayPermission, SenderAuthVerification, SenderRateLimit};
use smtphook::server::run_smtp_server;
use smtphook::SmtpProtocol;
use std::env;
use std::num::NonZeroU32;
use std::process;
use std::sync::Arc;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Wire the stock hooks according to `config`.
fn build_protocol(config: &Config) -> Result<SmtpProtocol, Error> {
    let mut builder = SmtpProtocol::builder()
        .message_size_limit(MessageSizeLimit::new(config.max_message_size))
        .rcpt_hook(Arc::new(SenderAuthVerification))
        .rcpt_hook(Arc::new(RelayPermission))
        .data_line_filter(Arc::new(ReceivedHeaderFilter::new(
            config.received_header_location,
        )))
        .message_hook(Arc::new(Reinject::new(
            &config.reinject_host,
            config.reinject_port,
        )));

    if let Some(limit) = config.max_sender_messages_per_minute.and_then(NonZeroU32::new) {
        builder = builder.mail_hook(Arc::new(SenderRateLimit::new(limit)));
    }

    builder.build()
}

#[tokio::main]
async fn main() {
    // default to info level
    let env = Env::new().filter_or("RUST_LOG", "info");
    env_logger::Builder::from_env(env)
        // disable timestamps - automatically added by systemd
        .format_timestamp(None)
        .init();

    let args: Vec<String> = env::args().collect();
    let Some(config_path) = args.get(1) else {
        eprintln!(
            "Usage: {} <config_file>",
            args.first().map(String::as_str).unwrap_or("smtphook")
        );
        process::exit(1);
    };

    let config = match Config::from_file(config_path) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("Failed to read config: {e}");
            process::exit(1);
        }
    };

    let protocol = match build_protocol(&config) {
        Ok(protocol) => Arc::new(protocol),
        Err(e) => {
            eprintln!("Failed to set up the SMTP engine: {e}");
            process::exit(1);
        }
    };
    log::debug!("Engine ready: {protocol:?}");

    if let Err(e) = run_smtp_server(config, protocol).await {
        eprintln!("Server error: {e}");
        process::exit(1);
    }
}
