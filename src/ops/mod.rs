// src/ops/mod.rs
//
// 🛡️ Orchestration Operations
// Composes the inventory, provider backends, command builders, remote executor
// and parsers into one-shot operations. Remote and provider failures are
// normalized into outcome records here; only corrupted local state escapes.

pub mod domain;
pub mod firewall;
pub mod fleet;
pub mod hardening;
pub mod lifecycle;
pub mod results;

#[cfg(test)]
pub(crate) mod testing;

use tracing::{debug, warn};

use crate::config::FleetConfig;
use crate::error::{FleetError, Result};
use crate::models::{ProviderKind, RemoteExecResult, ServerRecord};
use crate::sys::commands::RemoteScript;
use crate::sys::inventory::JsonInventory;
use crate::sys::parsers::parse_step_progress;
use crate::sys::providers::HttpProviderFactory;
use crate::sys::secrets::EnvTokenSource;
use crate::sys::ssh::OpenSshExecutor;
use crate::sys::traits::{CloudProvider, InventoryStore, ProviderFactory, RemoteExecutor, TokenSource};
use results::{Issue, Outcome};

// ==============================================================================
// Safe-Mode Gate
// ==============================================================================

/// Blocks destructive actions. Built from the config handed to the service,
/// never from ambient process state.
#[derive(Debug, Clone, Copy)]
pub struct SafeModeGate {
    enabled: bool,
}

impl SafeModeGate {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn check(&self, action: &str) -> Result<()> {
        if self.enabled {
            warn!("🛡️ Safe mode blocked destructive action: {}", action);
            return Err(FleetError::SafetyAbort(format!(
                "{} is disabled while safe mode is on (FLEETKEEPER_SAFE_MODE)",
                action
            )));
        }
        Ok(())
    }
}

/// Operation boundary: normalized failures become `success: false` outcomes,
/// local-state defects propagate.
fn settle<T: Outcome>(result: Result<T>) -> Result<T> {
    match result {
        Ok(outcome) => Ok(outcome),
        Err(e) if e.is_local_defect() => Err(e),
        Err(e) => {
            debug!("Operation failed: {}", e);
            Ok(T::failed(Issue::from_error(&e)))
        }
    }
}

// ==============================================================================
// Fleet Service
// ==============================================================================

pub struct FleetService {
    config: FleetConfig,
    inventory: Box<dyn InventoryStore>,
    executor: Box<dyn RemoteExecutor>,
    providers: Box<dyn ProviderFactory>,
    tokens: Box<dyn TokenSource>,
}

impl FleetService {
    pub fn new(config: FleetConfig) -> Self {
        Self {
            inventory: Box::new(JsonInventory::new(config.inventory_path())),
            executor: Box::new(OpenSshExecutor::new(
                config.ssh_user.clone(),
                config.ssh_identity.clone(),
                config.ssh_connect_timeout,
                config.ssh_command_timeout,
            )),
            providers: Box::new(HttpProviderFactory),
            tokens: Box::new(EnvTokenSource),
            config,
        }
    }

    pub fn with_parts(
        config: FleetConfig,
        inventory: Box<dyn InventoryStore>,
        executor: Box<dyn RemoteExecutor>,
        providers: Box<dyn ProviderFactory>,
        tokens: Box<dyn TokenSource>,
    ) -> Self {
        Self {
            config,
            inventory,
            executor,
            providers,
            tokens,
        }
    }

    pub async fn list_servers(&self) -> Result<Vec<ServerRecord>> {
        self.inventory.list().await
    }

    fn safe_mode(&self) -> SafeModeGate {
        SafeModeGate::new(self.config.safe_mode)
    }

    async fn resolve_server(&self, selector: &str) -> Result<ServerRecord> {
        self.inventory
            .find(selector.trim())
            .await?
            .ok_or_else(|| FleetError::NotFound(format!("Server not found: {}", selector)))
    }

    /// Backend for `kind`, bound to its resolved token.
    fn provider_for(&self, kind: ProviderKind) -> Result<Box<dyn CloudProvider>> {
        let credential = self.tokens.token_for(kind).ok_or_else(|| {
            FleetError::Auth(format!(
                "No API token for {}. Export {} and retry.",
                kind,
                kind.token_env()
            ))
        })?;
        Ok(self.providers.connect(kind, credential))
    }

    /// Runs a single command on the record's sshd; the exit code is the caller's to interpret.
    async fn run(&self, target: &ServerRecord, command: &str) -> Result<RemoteExecResult> {
        debug!("Executing on {}:{}: {}", target.ip, target.ssh_port, command);
        self.executor.execute(&target.ip, target.ssh_port, command).await
    }

    /// Runs a single command and turns a non-zero exit into `FleetError::Command`.
    async fn run_checked(&self, target: &ServerRecord, command: &str) -> Result<String> {
        let result = self.run(target, command).await?;
        if !result.success() {
            return Err(FleetError::Command {
                exit_code: result.exit_code,
                failed_step: None,
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(result.stdout)
    }

    /// Runs a step-aware script in one round trip. On failure the first step
    /// without a completion marker is reported as the failed one.
    async fn run_script(&self, target: &ServerRecord, script: &RemoteScript) -> Result<String> {
        let result = self.run(target, &script.render()).await?;
        let (completed, stdout) = parse_step_progress(&result.stdout);

        if !result.success() {
            let failed_step = script.label_at(completed).map(str::to_string);
            warn!(
                "Remote script on {} failed at step {} ({:?}) with exit code {}",
                target.ip,
                completed + 1,
                failed_step,
                result.exit_code
            );
            return Err(FleetError::Command {
                exit_code: result.exit_code,
                failed_step,
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(stdout)
    }
}
