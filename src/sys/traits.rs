use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ProviderKind, RemoteExecResult, ServerRecord, Snapshot, SnapshotCost};
use crate::sys::secrets::ProviderCredential;

// ==============================================================================
// 1. Remote Execution (Authenticated Shell Channel)
// ==============================================================================

#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Runs a single command string on `host` (sshd on `port`) and returns its
    /// exit code and output.
    /// 🛡️ Transport failures (refused, timeout, key rejected) surface as
    /// `FleetError::Transport`; a non-zero exit code is NOT an error at this layer.
    async fn execute(&self, host: &str, port: u16, command: &str) -> Result<RemoteExecResult>;
}

// ==============================================================================
// 2. Cloud Provider Capability (Closed Set of Backends)
// ==============================================================================

#[async_trait]
pub trait CloudProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// `Ok(false)` means the API answered and rejected the token.
    async fn validate_token(&self) -> Result<bool>;

    async fn destroy_server(&self, server_id: &str) -> Result<()>;

    async fn create_snapshot(&self, server_id: &str, name: &str) -> Result<Snapshot>;

    async fn list_snapshots(&self, server_id: &str) -> Result<Vec<Snapshot>>;

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()>;

    /// Monthly storage cost for a snapshot of `size_gb`.
    fn snapshot_cost_estimate(&self, size_gb: f64) -> SnapshotCost;
}

/// Selects the backend implementation once, from an already validated enum.
pub trait ProviderFactory: Send + Sync {
    fn connect(&self, kind: ProviderKind, credential: ProviderCredential) -> Box<dyn CloudProvider>;
}

// ==============================================================================
// 3. Inventory Store (Single Source of Local Truth)
// ==============================================================================

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn list(&self) -> Result<Vec<ServerRecord>>;

    /// Matches on name first, then on IP address.
    async fn find(&self, name_or_ip: &str) -> Result<Option<ServerRecord>>;

    async fn save(&self, record: ServerRecord) -> Result<()>;

    /// Returns `true` when a record with `id` existed and was removed.
    async fn remove(&self, id: &str) -> Result<bool>;
}

// ==============================================================================
// 4. Credential Resolution
// ==============================================================================

pub trait TokenSource: Send + Sync {
    fn token_for(&self, kind: ProviderKind) -> Option<ProviderCredential>;
}
