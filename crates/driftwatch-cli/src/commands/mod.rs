// crates/driftwatch-cli/src/commands/mod.rs
//
// Command module declarations for the Driftwatch CLI, plus the read-only
// store handles every command shares.

pub mod audit;
pub mod baseline;
pub mod production;
pub mod versions;

use driftwatch_store::{RocksAuditLog, RocksRegistry};

use crate::output::OutputFormat;

/// Where the daemon keeps its data and how to print results.
#[derive(Debug, Clone)]
pub struct Context {
    pub data_dir: String,
    pub format: OutputFormat,
}

impl Context {
    /// Open the daemon's registry without taking its write lock.
    pub fn registry(&self) -> Result<RocksRegistry, Box<dyn std::error::Error>> {
        Ok(RocksRegistry::open_read_only(&format!(
            "{}/registry",
            self.data_dir
        ))?)
    }

    /// Open the daemon's audit log without taking its write lock.
    pub fn audit_log(&self) -> Result<RocksAuditLog, Box<dyn std::error::Error>> {
        Ok(RocksAuditLog::open_read_only(&format!(
            "{}/audit",
            self.data_dir
        ))?)
    }
}
