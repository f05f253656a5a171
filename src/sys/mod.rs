// 🛡️ Zero-Trust Architecture: every value bound for a remote shell passes validate.rs,
// every credential lives in secrets.rs, every backend sits behind traits.rs.

pub mod traits;       // Global contracts
pub mod secrets;      // Memory hygiene (ProviderCredential)
pub mod validate;     // Allow-list input checks
pub mod commands;     // Remote command builders
pub mod parsers;      // Remote output tokenizers
pub mod diagnostics;  // Error kinds & remediation hints
pub mod inventory;    // Local server records
pub mod ssh;          // OpenSSH remote executor
pub mod providers;    // Cloud provider backends
