// src/sys/validate.rs
//
// 🛡️ Zero-Trust: every value that can reach a remote shell passes through here first.

use regex::Regex;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

use crate::error::{FleetError, Result};

static DOMAIN_GRAMMAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$").expect("domain grammar")
});

/// Rejects malformed IPv4 strings, `0.0.0.0`, and the loopback range.
pub fn validate_ipv4(ip: &str) -> Result<Ipv4Addr> {
    let addr: Ipv4Addr = ip
        .trim()
        .parse()
        .map_err(|_| FleetError::Validation(format!("Invalid IPv4 address: '{}'", ip)))?;

    if addr.is_unspecified() {
        return Err(FleetError::Validation("0.0.0.0 is not a reachable server address".into()));
    }
    if addr.is_loopback() {
        return Err(FleetError::Validation(format!(
            "{} is a loopback address and cannot be a managed server",
            addr
        )));
    }
    Ok(addr)
}

/// DNS-label style: lowercase letters, digits and hyphens, 3-63 chars,
/// starting with a letter and ending with a letter or digit.
pub fn validate_server_name(name: &str) -> Result<()> {
    let bytes = name.as_bytes();
    let shaped = match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            (3..=63).contains(&bytes.len())
                && first.is_ascii_lowercase()
                && (last.is_ascii_lowercase() || last.is_ascii_digit())
                && bytes.iter().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        }
        _ => false,
    };

    if !shaped {
        return Err(FleetError::Validation(format!(
            "Invalid server name '{}': use 3-63 lowercase letters, digits or hyphens, starting with a letter and ending with a letter or digit",
            name
        )));
    }
    Ok(())
}

pub fn validate_port(port: u32) -> Result<u16> {
    match u16::try_from(port) {
        Ok(p) if p >= 1 => Ok(p),
        _ => Err(FleetError::Validation(format!(
            "Invalid port {}: must be between 1 and 65535",
            port
        ))),
    }
}

/// Strips scheme, path and port suffix. Idempotent.
pub fn sanitize_domain(input: &str) -> String {
    let mut s = input.trim().to_ascii_lowercase();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = s.strip_prefix(scheme) {
            s = rest.to_string();
        }
    }
    if let Some(idx) = s.find('/') {
        s.truncate(idx);
    }
    if let Some(idx) = s.rfind(':') {
        if s[idx + 1..].chars().all(|c| c.is_ascii_digit()) {
            s.truncate(idx);
        }
    }
    s
}

pub fn validate_domain(domain: &str) -> Result<()> {
    if domain.len() > 253 || !DOMAIN_GRAMMAR.is_match(domain) {
        return Err(FleetError::Validation(format!("Invalid domain name: '{}'", domain)));
    }
    Ok(())
}

/// Raw user input for a domain may only carry URL characters (RFC 3986
/// unreserved and reserved sets); checked before sanitizing.
pub fn validate_url_chars(input: &str) -> Result<()> {
    let input = input.trim();
    let ok = !input.is_empty()
        && input.chars().all(|c| {
            c.is_ascii_alphanumeric()
                || matches!(
                    c,
                    '-' | '.' | '_' | '~' | ':' | '/' | '?' | '#' | '[' | ']' | '@' | '!' | '$' | '&' | '\''
                        | '(' | ')' | '*' | '+' | ',' | ';' | '=' | '%'
                )
        });
    if !ok {
        return Err(FleetError::Validation(format!(
            "Domain contains characters outside the URL-safe set: '{}'",
            input
        )));
    }
    Ok(())
}

/// 🛡️ Last line before interpolation: fail closed on anything outside
/// alphanumerics, dot, colon, hyphen and underscore. Never escape.
pub fn assert_shell_safe(value: &str) -> Result<()> {
    if value.is_empty()
        || !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | ':' | '-' | '_'))
    {
        return Err(FleetError::Validation(format!(
            "Zero-Trust: refusing to interpolate unsafe value '{}'",
            value
        )));
    }
    Ok(())
}
