// src/sys/ssh.rs
//
// 🛡️ SOLID: Single-Responsibility, moving one command string to one host.
// Handshake, host keys and authentication are left to the system OpenSSH client.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{FleetError, Result};
use crate::models::RemoteExecResult;
use crate::sys::traits::RemoteExecutor;
use crate::sys::validate::validate_ipv4;

/// ssh reserves exit status 255 for its own failures.
const SSH_TRANSPORT_EXIT: i32 = 255;

pub struct OpenSshExecutor {
    user: String,
    identity: Option<PathBuf>,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl OpenSshExecutor {
    pub fn new(user: String, identity: Option<PathBuf>, connect_timeout: Duration, command_timeout: Duration) -> Self {
        Self {
            user,
            identity,
            connect_timeout,
            command_timeout,
        }
    }

    fn build_args(&self, host: &str, port: u16, command: &str) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(), port.to_string(),
            "-o".to_string(), "BatchMode=yes".to_string(),
            "-o".to_string(), "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(), format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            "-o".to_string(), "LogLevel=ERROR".to_string(),
        ];
        if let Some(identity) = &self.identity {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
            args.push("-o".to_string());
            args.push("IdentitiesOnly=yes".to_string());
        }
        // End of options: neither destination nor command can be read as an ssh flag.
        args.push("--".to_string());
        args.push(format!("{}@{}", self.user, host));
        args.push(command.to_string());
        args
    }
}

/// Maps OpenSSH's own diagnostics to errno-style codes the normalizer knows.
fn transport_code(stderr: &str) -> Option<String> {
    let code = if stderr.contains("Connection refused") {
        "ECONNREFUSED"
    } else if stderr.contains("Connection timed out") || stderr.contains("Operation timed out") {
        "ETIMEDOUT"
    } else if stderr.contains("Connection reset") || stderr.contains("Connection closed") {
        "ECONNRESET"
    } else if stderr.contains("No route to host") || stderr.contains("Network is unreachable") {
        "EHOSTUNREACH"
    } else if stderr.contains("Could not resolve hostname") {
        "ENOTFOUND"
    } else {
        return None;
    };
    Some(code.to_string())
}

fn looks_like_transport_failure(stderr: &str) -> bool {
    transport_code(stderr).is_some()
        || stderr.contains("Permission denied (")
        || stderr.contains("Host key verification failed")
        || stderr.contains("REMOTE HOST IDENTIFICATION HAS CHANGED")
        || stderr.starts_with("ssh:")
        || stderr.contains("kex_exchange_identification")
}

#[async_trait]
impl RemoteExecutor for OpenSshExecutor {
    async fn execute(&self, host: &str, port: u16, command: &str) -> Result<RemoteExecResult> {
        // 🛡️ Zero-Trust: the host is re-validated even though callers already did.
        validate_ipv4(host)?;
        if port == 0 {
            return Err(FleetError::Validation("SSH port must be between 1 and 65535".into()));
        }

        debug!(host, port, "ssh exec");
        let child = Command::new("ssh")
            .args(self.build_args(host, port, command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match timeout(self.command_timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                let code = match e.kind() {
                    std::io::ErrorKind::NotFound => Some("ENOENT".to_string()),
                    std::io::ErrorKind::PermissionDenied => Some("EACCES".to_string()),
                    _ => None,
                };
                return Err(FleetError::Transport {
                    code,
                    message: format!("Failed to spawn ssh: {}", e),
                });
            }
            Err(_) => {
                return Err(FleetError::Transport {
                    code: Some("ETIMEDOUT".to_string()),
                    message: format!(
                        "Command on {} did not finish within {}s",
                        host,
                        self.command_timeout.as_secs()
                    ),
                });
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if exit_code == SSH_TRANSPORT_EXIT && looks_like_transport_failure(&stderr) {
            return Err(FleetError::Transport {
                code: transport_code(&stderr),
                message: stderr.trim().to_string(),
            });
        }

        Ok(RemoteExecResult {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor(identity: Option<PathBuf>) -> OpenSshExecutor {
        OpenSshExecutor::new("root".into(), identity, Duration::from_secs(10), Duration::from_secs(60))
    }

    #[test]
    fn args_end_options_before_command() {
        let args = executor(None).build_args("1.2.3.4", 22, "uptime");
        let n = args.len();
        assert_eq!(args[n - 3], "--");
        assert_eq!(args[n - 2], "root@1.2.3.4");
        assert_eq!(args[n - 1], "uptime");
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"ConnectTimeout=10".to_string()));
        assert!(!args.contains(&"-i".to_string()));
        assert_eq!(args[0], "-p");
        assert_eq!(args[1], "22");
    }

    #[test]
    fn moved_port_is_dialled() {
        let args = executor(None).build_args("1.2.3.4", 2222, "true");
        let p = args.iter().position(|a| a == "-p").unwrap();
        assert_eq!(args[p + 1], "2222");
        assert!(p < args.iter().position(|a| a == "--").unwrap());
    }

    #[test]
    fn identity_file_is_passed() {
        let args = executor(Some(PathBuf::from("/keys/id_ed25519"))).build_args("1.2.3.4", 22, "true");
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "/keys/id_ed25519");
        assert!(args.contains(&"IdentitiesOnly=yes".to_string()));
    }

    #[test]
    fn transport_codes_from_stderr() {
        assert_eq!(
            transport_code("ssh: connect to host 1.2.3.4 port 22: Connection refused").as_deref(),
            Some("ECONNREFUSED")
        );
        assert_eq!(
            transport_code("ssh: connect to host 1.2.3.4 port 22: Connection timed out").as_deref(),
            Some("ETIMEDOUT")
        );
        assert_eq!(transport_code("bash: foo: command not found"), None);
        assert!(looks_like_transport_failure("root@1.2.3.4: Permission denied (publickey)."));
        assert!(!looks_like_transport_failure("E: Unable to locate package"));
    }

    #[tokio::test]
    async fn rejects_invalid_host_before_spawning() {
        let err = executor(None).execute("1.2.3.4; rm -rf /", 22, "true").await.unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));
    }
}
