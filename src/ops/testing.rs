// src/ops/testing.rs
//
// In-memory collaborators for operation tests. Each fake shares its state
// through an Arc so a test keeps a handle after boxing it into the service.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::{Arc, Mutex};

use super::FleetService;
use crate::config::FleetConfig;
use crate::error::{FleetError, Result};
use crate::models::{
    ProviderKind, RemoteExecResult, ServerMode, ServerRecord, Snapshot, SnapshotCost, DEFAULT_SSH_PORT,
};
use crate::sys::commands::STEP_MARKER;
use crate::sys::secrets::{ProviderCredential, StaticTokenSource};
use crate::sys::traits::{CloudProvider, InventoryStore, ProviderFactory, RemoteExecutor};

// ==============================================================================
// Remote Executor
// ==============================================================================

#[derive(Clone, Debug)]
pub enum Reply {
    Exit { code: i32, stdout: String, stderr: String },
    Transport(&'static str),
    /// The executor refused the call before reaching the host.
    Rejected(&'static str),
}

impl Reply {
    pub fn ok(stdout: &str) -> Self {
        Reply::Exit {
            code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn fail(code: i32, stderr: &str) -> Self {
        Reply::Exit {
            code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    /// A step-aware script that completed `done` steps and then failed.
    pub fn failed_after(done: usize, stderr: &str) -> Self {
        let stdout = (1..=done).map(|n| format!("{}{}\n", STEP_MARKER, n)).collect();
        Reply::Exit {
            code: 1,
            stdout,
            stderr: stderr.to_string(),
        }
    }
}

#[derive(Default)]
struct ExecState {
    rules: Vec<(String, Reply)>,
    calls: Vec<String>,
}

/// Answers with the first rule whose fragment occurs in `host:port: command`;
/// unmatched commands succeed with empty output.
#[derive(Clone, Default)]
pub struct FakeExecutor {
    state: Arc<Mutex<ExecState>>,
}

impl FakeExecutor {
    pub fn on(self, fragment: &str, reply: Reply) -> Self {
        self.state.lock().unwrap().rules.push((fragment.to_string(), reply));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn ran(&self, fragment: &str) -> bool {
        self.calls().iter().any(|c| c.contains(fragment))
    }
}

#[async_trait]
impl RemoteExecutor for FakeExecutor {
    async fn execute(&self, host: &str, port: u16, command: &str) -> Result<RemoteExecResult> {
        let call = format!("{}:{}: {}", host, port, command);
        let mut state = self.state.lock().unwrap();
        let reply = state
            .rules
            .iter()
            .find(|(fragment, _)| call.contains(fragment.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Reply::ok(""));
        state.calls.push(call);

        match reply {
            Reply::Exit { code, stdout, stderr } => Ok(RemoteExecResult {
                exit_code: code,
                stdout,
                stderr,
            }),
            Reply::Transport(code) => Err(FleetError::Transport {
                code: Some(code.to_string()),
                message: format!("ssh: connect to host {} port {}: {}", host, port, code),
            }),
            Reply::Rejected(reason) => Err(FleetError::Validation(reason.to_string())),
        }
    }
}

// ==============================================================================
// Cloud Provider
// ==============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloudReply {
    Ok,
    NotFound,
    ServerError,
}

impl CloudReply {
    fn into_result(self) -> Result<()> {
        match self {
            CloudReply::Ok => Ok(()),
            CloudReply::NotFound => Err(FleetError::Http {
                status: 404,
                message: "server not found".into(),
            }),
            CloudReply::ServerError => Err(FleetError::Http {
                status: 503,
                message: "service unavailable".into(),
            }),
        }
    }
}

struct CloudState {
    token_valid: bool,
    token_check: CloudReply,
    destroy: CloudReply,
    snapshots: Vec<Snapshot>,
    list_fails_for: Vec<String>,
    calls: Vec<String>,
}

#[derive(Clone)]
pub struct FakeCloud {
    state: Arc<Mutex<CloudState>>,
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(CloudState {
                token_valid: true,
                token_check: CloudReply::Ok,
                destroy: CloudReply::Ok,
                snapshots: Vec::new(),
                list_fails_for: Vec::new(),
                calls: Vec::new(),
            })),
        }
    }
}

impl FakeCloud {
    pub fn invalid_token(self) -> Self {
        self.state.lock().unwrap().token_valid = false;
        self
    }

    /// The token check itself fails instead of answering.
    pub fn token_check_reply(self, reply: CloudReply) -> Self {
        self.state.lock().unwrap().token_check = reply;
        self
    }

    pub fn destroy_reply(self, reply: CloudReply) -> Self {
        self.state.lock().unwrap().destroy = reply;
        self
    }

    pub fn with_snapshot(self, id: &str, size_gb: f64) -> Self {
        self.state.lock().unwrap().snapshots.push(Snapshot {
            id: id.to_string(),
            name: format!("snap-{}", id),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            size_gb: Some(size_gb),
        });
        self
    }

    /// A snapshot whose backend reports no size.
    pub fn with_unsized_snapshot(self, id: &str) -> Self {
        self.state.lock().unwrap().snapshots.push(Snapshot {
            id: id.to_string(),
            name: format!("snap-{}", id),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            size_gb: None,
        });
        self
    }

    pub fn list_fails_for(self, server_id: &str) -> Self {
        self.state.lock().unwrap().list_fails_for.push(server_id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

struct FakeProvider {
    kind: ProviderKind,
    cloud: FakeCloud,
}

#[async_trait]
impl CloudProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn validate_token(&self) -> Result<bool> {
        self.cloud.record("validate_token".into());
        let state = self.cloud.state.lock().unwrap();
        state.token_check.into_result()?;
        Ok(state.token_valid)
    }

    async fn destroy_server(&self, server_id: &str) -> Result<()> {
        self.cloud.record(format!("destroy_server {}", server_id));
        let reply = self.cloud.state.lock().unwrap().destroy;
        reply.into_result()
    }

    async fn create_snapshot(&self, server_id: &str, name: &str) -> Result<Snapshot> {
        self.cloud.record(format!("create_snapshot {} {}", server_id, name));
        Ok(Snapshot {
            id: "new-1".into(),
            name: name.to_string(),
            created_at: "2026-01-02T00:00:00Z".into(),
            size_gb: None,
        })
    }

    async fn list_snapshots(&self, server_id: &str) -> Result<Vec<Snapshot>> {
        self.cloud.record(format!("list_snapshots {}", server_id));
        let state = self.cloud.state.lock().unwrap();
        if state.list_fails_for.iter().any(|id| id == server_id) {
            return CloudReply::ServerError.into_result().map(|_| Vec::new());
        }
        Ok(state.snapshots.clone())
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        self.cloud.record(format!("delete_snapshot {}", snapshot_id));
        Ok(())
    }

    fn snapshot_cost_estimate(&self, size_gb: f64) -> SnapshotCost {
        SnapshotCost {
            monthly: size_gb * 0.05,
            currency: "USD".into(),
        }
    }
}

impl ProviderFactory for FakeCloud {
    fn connect(&self, kind: ProviderKind, _credential: ProviderCredential) -> Box<dyn CloudProvider> {
        Box::new(FakeProvider {
            kind,
            cloud: self.clone(),
        })
    }
}

// ==============================================================================
// Inventory
// ==============================================================================

#[derive(Clone, Default)]
pub struct MemoryInventory {
    records: Arc<Mutex<Vec<ServerRecord>>>,
}

impl MemoryInventory {
    pub fn with(self, record: ServerRecord) -> Self {
        self.records.lock().unwrap().push(record);
        self
    }

    pub fn snapshot(&self) -> Vec<ServerRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl InventoryStore for MemoryInventory {
    async fn list(&self) -> Result<Vec<ServerRecord>> {
        Ok(self.snapshot())
    }

    async fn find(&self, name_or_ip: &str) -> Result<Option<ServerRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .find(|r| r.name == name_or_ip)
            .or_else(|| records.iter().find(|r| r.ip == name_or_ip))
            .cloned())
    }

    async fn save(&self, record: ServerRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        records.retain(|r| r.id != record.id);
        records.push(record);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() != before)
    }
}

// ==============================================================================
// Harness
// ==============================================================================

pub fn server(name: &str, ip: &str, id: &str) -> ServerRecord {
    ServerRecord {
        id: id.to_string(),
        name: name.to_string(),
        provider: ProviderKind::Hetzner,
        ip: ip.to_string(),
        region: "nbg1".to_string(),
        size: "cx22".to_string(),
        created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        mode: ServerMode::Coolify,
        ssh_port: DEFAULT_SSH_PORT,
    }
}

#[derive(Clone, Default)]
pub struct Harness {
    pub exec: FakeExecutor,
    pub cloud: FakeCloud,
    pub inventory: MemoryInventory,
}

impl Harness {
    /// Service with a Hetzner token only.
    pub fn service(&self) -> FleetService {
        self.build(FleetConfig::default(), StaticTokenSource::default().with(ProviderKind::Hetzner, "hz-token"))
    }

    pub fn safe_service(&self) -> FleetService {
        self.configured_service(FleetConfig {
            safe_mode: true,
            ..FleetConfig::default()
        })
    }

    /// Service with a Hetzner token and the given configuration.
    pub fn configured_service(&self, config: FleetConfig) -> FleetService {
        self.build(config, StaticTokenSource::default().with(ProviderKind::Hetzner, "hz-token"))
    }

    pub fn tokenless_service(&self) -> FleetService {
        self.build(FleetConfig::default(), StaticTokenSource::default())
    }

    fn build(&self, config: FleetConfig, tokens: StaticTokenSource) -> FleetService {
        FleetService::with_parts(
            config,
            Box::new(self.inventory.clone()),
            Box::new(self.exec.clone()),
            Box::new(self.cloud.clone()),
            Box::new(tokens),
        )
    }
}
