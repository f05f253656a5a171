// src/sys/diagnostics.rs
//
// Error normalizer: every failure that leaves an operation is turned into a
// kind, a scrubbed message and (when we know one) a remediation hint.
// Classification order is fixed: HTTP status, transport code, message text.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::error::{ErrorKind, FleetError};

static URL_CREDENTIALS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(://)([^@/\s]+)@").expect("url credential pattern"));
static BEARER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(bearer\s+)[A-Za-z0-9._~+/=-]+").expect("bearer pattern"));
static QUERY_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)((?:token|api_key|apikey|access_token)=)[^&\s]+").expect("query token pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnosis {
    pub kind: ErrorKind,
    pub message: String,
    pub hint: Option<String>,
}

/// 🛡️ Redacts credentials embedded in URLs, bearer headers and query strings.
pub fn scrub_credentials(input: &str) -> String {
    let s = URL_CREDENTIALS.replace_all(input, "$1[REDACTED]@");
    let s = BEARER_TOKEN.replace_all(&s, "$1[REDACTED]");
    QUERY_TOKEN.replace_all(&s, "$1[REDACTED]").into_owned()
}

pub fn diagnose(err: &FleetError) -> Diagnosis {
    let message = scrub_credentials(&err.to_string());

    let hint = match err {
        FleetError::Http { status, .. } => hint_for_status(*status),
        _ => None,
    }
    .or_else(|| match err {
        FleetError::Transport { code: Some(code), .. } => hint_for_code(code),
        FleetError::Io(e) => io_code(e.kind()).and_then(hint_for_code),
        _ => None,
    })
    .or_else(|| hint_for_message(&message))
    .or_else(|| default_hint(err.kind()));

    Diagnosis {
        kind: err.kind(),
        message,
        hint: hint.map(str::to_string),
    }
}

fn hint_for_status(status: u16) -> Option<&'static str> {
    Some(match status {
        400 | 422 => "The provider rejected the request parameters. Check the server id, region and size.",
        401 => "The API token is invalid or expired. Generate a new token in the provider console and export it again.",
        403 => "The API token lacks permission for this action. Use a token with read/write scope.",
        404 => "The resource does not exist on the provider. It may have been deleted from the provider console.",
        409 | 423 => "The resource is busy or locked by another action. Wait a minute and retry.",
        429 => "The provider is rate limiting requests. Wait a few minutes before retrying.",
        500..=599 => "The provider API is having problems. Check the provider status page and retry later.",
        _ => return None,
    })
}

/// Local filesystem failures share the errno-style hints of the transport layer.
fn io_code(kind: std::io::ErrorKind) -> Option<&'static str> {
    match kind {
        std::io::ErrorKind::PermissionDenied => Some("EACCES"),
        std::io::ErrorKind::StorageFull => Some("ENOSPC"),
        std::io::ErrorKind::NotFound => Some("ENOENT"),
        _ => None,
    }
}

fn hint_for_code(code: &str) -> Option<&'static str> {
    Some(match code {
        "ECONNREFUSED" => "The server refused the SSH connection. Check that sshd is running and the port is open.",
        "ETIMEDOUT" => "The connection timed out. Check that the server is running and that a firewall is not blocking SSH.",
        "ECONNRESET" => "The connection was reset. The server may be rebooting or overloaded; retry shortly.",
        "EHOSTUNREACH" => "The host is unreachable. Check the IP address and your network route.",
        "ENOTFOUND" => "The host name could not be resolved. Check the address and your DNS settings.",
        "EACCES" => "Permission denied on a local file. Check the permissions of the inventory directory and SSH key.",
        "ENOSPC" => "A disk is full. Free some space and retry.",
        "ENOENT" => "A required local program or file is missing. Check FLEETKEEPER_HOME and make sure the OpenSSH client is installed.",
        _ => return None,
    })
}

fn hint_for_message(message: &str) -> Option<&'static str> {
    const PATTERNS: &[(&str, &str)] = &[
        (
            "REMOTE HOST IDENTIFICATION HAS CHANGED",
            "The server's host key changed. If the server was rebuilt, remove the old entry with `ssh-keygen -R <ip>`.",
        ),
        (
            "Host key verification failed",
            "The server's host key could not be verified. Remove the stale entry with `ssh-keygen -R <ip>` and retry.",
        ),
        (
            "Permission denied (publickey",
            "SSH key authentication failed. Make sure your public key is in the server's authorized_keys.",
        ),
        (
            "Connection timed out",
            "The connection timed out. Check that the server is running and that a firewall is not blocking SSH.",
        ),
        (
            "Connection refused",
            "The server refused the SSH connection. Check that sshd is running and the port is open.",
        ),
        (
            "Could not resolve hostname",
            "The host name could not be resolved. Check the address and your DNS settings.",
        ),
        ("No space left on device", "The server's disk is full. Free some space and retry."),
        (
            "Could not get lock",
            "Another package manager process holds the apt lock. Wait for it to finish and retry.",
        ),
    ];

    PATTERNS
        .iter()
        .find(|(needle, _)| message.contains(needle))
        .map(|(_, hint)| *hint)
}

fn default_hint(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::Auth => Some("Check that the provider API token is set and valid."),
        ErrorKind::RateLimit => Some("Wait a few minutes before retrying."),
        ErrorKind::ProviderServer => Some("The provider API is having problems. Retry later."),
        ErrorKind::Transport => {
            Some("Check SSH connectivity with `ssh -p <port> <user>@<ip>`, using the FLEETKEEPER_SSH_USER account.")
        }
        ErrorKind::Command => Some("Inspect the remote output above and retry once the cause is fixed."),
        _ => None,
    }
}
