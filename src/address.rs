//! Mail addresses as they appear in SMTP envelopes.

use crate::error::Error;
use mailparse::MailAddr;
use std::fmt;

/// An envelope address `local-part@domain`, or the null reverse path `<>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MailAddress {
    local_part: String,
    domain: String,
}

impl MailAddress {
    /// The null reverse path used by bounces.
    pub fn null_sender() -> Self {
        Self {
            local_part: String::new(),
            domain: String::new(),
        }
    }

    /// Parse an address without angle brackets.
    ///
    /// RFC 821 source routes (`@relay1,@relay2:user@host`) are dropped.
    pub fn parse(address: &str) -> Result<Self, Error> {
        let address = address.trim();
        let invalid = |reason| Error::InvalidAddress {
            address: address.to_string(),
            reason,
        };

        let address = strip_source_route(address);
        if address.is_empty() {
            return Err(invalid("empty address"));
        }
        if address.chars().any(|c| c.is_whitespace() || c == '<' || c == '>') {
            return Err(invalid("unexpected character"));
        }

        let Some((local_part, domain)) = address.rsplit_once('@') else {
            return Err(invalid("missing @"));
        };
        if local_part.is_empty() {
            return Err(invalid("no local-part"));
        }
        if domain.is_empty() {
            return Err(invalid("no domain"));
        }

        if !is_domain_literal(domain) {
            match mailparse::addrparse(address) {
                Ok(parsed) => match parsed.first() {
                    Some(MailAddr::Single(single))
                        if parsed.len() == 1
                            && single.display_name.is_none()
                            && single.addr == address => {}
                    _ => return Err(invalid("not a single mailbox")),
                },
                Err(_) => return Err(invalid("malformed addr-spec")),
            }
        }

        Ok(Self {
            local_part: local_part.to_string(),
            domain: domain.to_string(),
        })
    }

    /// Parse a path argument of MAIL or RCPT, appending `@default_domain`
    /// when no domain is present.
    pub fn parse_with_default_domain(address: &str, default_domain: &str) -> Result<Self, Error> {
        if address.contains('@') {
            Self::parse(address)
        } else {
            Self::parse(&format!("{}@{}", address.trim(), default_domain))
        }
    }

    pub fn is_null_sender(&self) -> bool {
        self.local_part.is_empty() && self.domain.is_empty()
    }

    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    /// Domain part; a domain literal is returned without its brackets.
    pub fn domain(&self) -> &str {
        self.domain
            .strip_prefix('[')
            .and_then(|d| d.strip_suffix(']'))
            .unwrap_or(&self.domain)
    }
}

impl fmt::Display for MailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null_sender() {
            Ok(())
        } else {
            write!(f, "{}@{}", self.local_part, self.domain)
        }
    }
}

fn strip_source_route(address: &str) -> &str {
    if address.starts_with('@')
        && let Some((_, mailbox)) = address.split_once(':')
    {
        mailbox
    } else {
        address
    }
}

fn is_domain_literal(domain: &str) -> bool {
    domain.starts_with('[') && domain.ends_with(']') && domain.len() > 2
}
