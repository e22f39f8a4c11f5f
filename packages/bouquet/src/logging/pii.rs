//! Masking for values that end up in log lines.

use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Headers whose values are never logged, not even partially.
const SECRET_HEADERS: [&str; 6] = [
    "authorization",
    "cookie",
    "proxy-authorization",
    "set-cookie",
    "x-csrf-token",
    "x-xsrf-token",
];

pub const REDACTED: &str = "[REDACTED]";
pub const REDACTED_TOKEN: &str = "[REDACTED_TOKEN]";

#[allow(clippy::unwrap_used)]
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{1,}\b").unwrap());

// The base64 alphabet covers hex too; dashes are excluded so uuids stay readable.
#[allow(clippy::unwrap_used)]
static OPAQUE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9+/]{16,}={0,2}").unwrap());

/// Masks e-mail addresses (first character of the local part kept) and long opaque tokens.
pub fn redact(input: &str) -> String {
    let emails_masked = EMAIL.replace_all(input, |caps: &Captures| {
        let found = &caps[0];
        match found.split_once('@') {
            Some((local, domain)) => match local.chars().next() {
                Some(first) => format!("{first}***@{domain}"),
                None => format!("@{domain}"),
            },
            None => found.to_string(),
        }
    });

    OPAQUE_TOKEN
        .replace_all(&emails_masked, REDACTED_TOKEN)
        .into_owned()
}

/// Redacts a header value according to its name.
pub fn redact_header(name: &str, value: &str) -> String {
    if SECRET_HEADERS
        .iter()
        .any(|secret| secret.eq_ignore_ascii_case(name))
    {
        REDACTED.to_string()
    } else {
        redact(value)
    }
}

/// Formats as the redacted form of the wrapped string.
pub struct Redacted<'a>(pub &'a str);

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&redact(self.0))
    }
}

impl fmt::Debug for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
