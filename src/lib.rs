// src/lib.rs
//
// ⚙️ Fleetkeeper: provisioning-side lifecycle and remote hardening for a
// small fleet of self-hosted Coolify servers.

pub mod config;
pub mod error;
pub mod models;
pub mod ops;
pub mod sys;

pub use config::FleetConfig;
pub use error::{ErrorKind, FleetError, Result};
pub use ops::FleetService;
