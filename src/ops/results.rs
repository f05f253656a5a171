// src/ops/results.rs
//
// Caller-facing outcome records. Every operation answers with `success` plus
// its payload; failures carry a normalized kind, a scrubbed message and a hint.

use serde::Serialize;

use crate::error::{ErrorKind, FleetError};
use crate::models::{FirewallStatus, SecureAuditResult, ServerMode, ServerRecord, Snapshot, SnapshotCost};
use crate::sys::diagnostics::diagnose;

/// Error/hint/warning fields shared by every outcome, flattened into it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Issue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl Issue {
    pub fn from_error(err: &FleetError) -> Self {
        let diagnosis = diagnose(err);
        Self {
            error: Some(diagnosis.message),
            kind: Some(diagnosis.kind),
            hint: diagnosis.hint,
            warning: None,
        }
    }

    pub fn hint(hint: impl Into<String>) -> Self {
        Self {
            hint: Some(hint.into()),
            ..Self::default()
        }
    }

    pub fn warning(warning: impl Into<String>) -> Self {
        Self {
            warning: Some(warning.into()),
            ..Self::default()
        }
    }
}

/// Implemented by every outcome so the operation boundary can turn a
/// normalized error into a `success: false` record.
pub trait Outcome: Sized {
    fn failed(issue: Issue) -> Self;
    fn succeeded(&self) -> bool;
}

macro_rules! impl_outcome {
    ($ty:ty) => {
        impl Outcome for $ty {
            fn failed(issue: Issue) -> Self {
                Self {
                    success: false,
                    issue,
                    ..Default::default()
                }
            }

            fn succeeded(&self) -> bool {
                self.success
            }
        }
    };
}

// ==============================================================================
// 1. Lifecycle
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoolifyStatus {
    Running,
    ContainersDetected,
    NotDetected,
    SshUnavailable,
    VerificationFailed,
    /// Bare servers only report whether the remote channel answers.
    Reachable,
    Skipped,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddServerResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<CoolifyStatus>,
    #[serde(flatten)]
    pub issue: Issue,
}
impl_outcome!(AddServerResult);

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveServerResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerRecord>,
    #[serde(flatten)]
    pub issue: Issue,
}
impl_outcome!(RemoveServerResult);

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    pub cloud_deleted: bool,
    pub local_removed: bool,
    #[serde(flatten)]
    pub issue: Issue,
}
impl_outcome!(DestroyResult);

// ==============================================================================
// 2. Hardening
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureSetupResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    pub ssh_hardened: bool,
    pub fail2ban_installed: bool,
    /// Hardening applied but fail2ban did not install.
    pub partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    #[serde(flatten)]
    pub issue: Issue,
}
impl_outcome!(SecureSetupResult);

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureAuditOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<SecureAuditResult>,
    #[serde(flatten)]
    pub issue: Issue,
}
impl_outcome!(SecureAuditOutcome);

// ==============================================================================
// 3. Firewall
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<FirewallStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    #[serde(flatten)]
    pub issue: Issue,
}
impl_outcome!(FirewallResult);

// ==============================================================================
// 4. Domain
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// Stored FQDN after the operation; `None` from `info` means unset.
    pub fqdn: Option<String>,
    #[serde(flatten)]
    pub issue: Issue,
}
impl_outcome!(DomainResult);

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsCheckResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_ip: Option<String>,
    pub resolved_ip: Option<String>,
    #[serde(rename = "match")]
    pub matches: bool,
    #[serde(flatten)]
    pub issue: Issue,
}
impl_outcome!(DnsCheckResult);

// ==============================================================================
// 5. Fleet (Health & Snapshots)
// ==============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerHealth {
    pub server: String,
    pub ip: String,
    pub mode: ServerMode,
    pub status: CoolifyStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResult {
    pub success: bool,
    pub servers: Vec<ServerHealth>,
    #[serde(flatten)]
    pub issue: Issue,
}
impl_outcome!(HealthResult);

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub snapshots: Vec<Snapshot>,
    #[serde(flatten)]
    pub issue: Issue,
}
impl_outcome!(SnapshotResult);

/// One server's share of a fleet-wide snapshot listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSnapshots {
    pub server: String,
    pub snapshots: Vec<Snapshot>,
    #[serde(flatten)]
    pub issue: Issue,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetSnapshotsResult {
    pub success: bool,
    pub servers: Vec<ServerSnapshots>,
    #[serde(flatten)]
    pub issue: Issue,
}
impl_outcome!(FleetSnapshotsResult);

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotCostResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    pub snapshot_count: usize,
    pub total_size_gb: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<SnapshotCost>,
    #[serde(flatten)]
    pub issue: Issue,
}
impl_outcome!(SnapshotCostResult);
