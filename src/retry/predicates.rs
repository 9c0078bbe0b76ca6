//! Classification of failures as rate limits or transient network errors.
//!
//! Typed kinds are checked first. Provider, tool and storage errors often arrive as
//! opaque text from a remote side, so their messages are also scanned for well-known
//! markers. Errors that are fatal by kind (authentication, validation, configuration,
//! workflow limits) never match on text.

use crate::error::{ApiError, ErrorKind};

const RATE_LIMIT_MARKERS: &[&str] = &[
    "429",
    "rate limit",
    "rate_limit",
    "ratelimit",
    "quota exceeded",
    "too many requests",
    "resource_exhausted",
];

const NETWORK_MARKERS: &[&str] = &[
    "connection",
    "timeout",
    "timed out",
    "refused",
    "reset by peer",
    "broken pipe",
    "502",
    "503",
    "504",
];

fn message_matches(err: &ApiError, markers: &[&str]) -> bool {
    if !matches!(
        err.kind(),
        ErrorKind::Provider | ErrorKind::Tool | ErrorKind::Storage | ErrorKind::Network
    ) {
        return false;
    }
    let message = err.to_string().to_ascii_lowercase();
    markers.iter().any(|marker| message.contains(marker))
}

pub fn is_rate_limit(err: &ApiError) -> bool {
    err.kind() == ErrorKind::RateLimit || message_matches(err, RATE_LIMIT_MARKERS)
}

pub fn is_network(err: &ApiError) -> bool {
    matches!(err.kind(), ErrorKind::Network | ErrorKind::Timeout)
        || message_matches(err, NETWORK_MARKERS)
}
