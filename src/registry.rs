use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::bytecode::MatchKind;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("[E030] Failed to access registry file: {0}")]
    Io(#[from] std::io::Error),

    #[error("[E031] Failed to serialize/deserialize registry: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("[E032] Failed to find home directory")]
    NoHomeDir,

    #[error("[E033] Registration rejected: {0}")]
    Rejected(String),
}

impl RegistryError {
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "E030",
            Self::Serde(_) => "E031",
            Self::NoHomeDir => "E032",
            Self::Rejected(_) => "E033",
        }
    }
}

/// A verified contract, as recorded once the workflow reaches its last step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub contract_id: String,
    pub contract_name: String,
    pub compiler_version: String,
    pub source_file_name: String,
    pub match_kind: MatchKind,
    pub abi: Value,
    pub timestamp: DateTime<Utc>,
}

/// Where verified contracts end up.
#[async_trait]
pub trait ContractRegistry: Send + Sync {
    async fn register(&self, registration: &Registration) -> Result<(), RegistryError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct VerifiedContracts {
    pub records: HashMap<String, Registration>,
}

impl VerifiedContracts {
    pub fn add_record(&mut self, record: Registration) {
        self.records.insert(record.contract_id.clone(), record);
    }

    pub fn get_recent_records(&self, limit: usize) -> Vec<&Registration> {
        let mut records: Vec<&Registration> = self.records.values().collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.into_iter().take(limit).collect()
    }
}

/// JSON file holding every contract registered from this machine.
pub struct RegistryStore {
    registry_file: PathBuf,
}

impl RegistryStore {
    /// Store under `~/.hashscan-verifier/verified.json`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if there is no home directory or it can't be written.
    pub fn new() -> Result<Self, RegistryError> {
        let home_dir = dirs::home_dir().ok_or(RegistryError::NoHomeDir)?;
        Self::at(home_dir.join(".hashscan-verifier").join("verified.json"))
    }

    /// # Errors
    ///
    /// Will return `Err` if the parent directory can't be created.
    pub fn at(registry_file: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let registry_file = registry_file.into();
        if let Some(dir) = registry_file.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        Ok(Self { registry_file })
    }

    pub fn path(&self) -> &Path {
        &self.registry_file
    }

    /// # Errors
    ///
    /// Will return `Err` if the file exists but can't be read or parsed.
    pub fn load(&self) -> Result<VerifiedContracts, RegistryError> {
        if !self.registry_file.exists() {
            return Ok(VerifiedContracts::default());
        }

        let content = fs::read_to_string(&self.registry_file)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// # Errors
    ///
    /// Will return `Err` if the file can't be written.
    pub fn save(&self, contracts: &VerifiedContracts) -> Result<(), RegistryError> {
        let content = serde_json::to_string_pretty(contracts)?;
        fs::write(&self.registry_file, content)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Will return `Err` if the file can't be read or parsed.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<Registration>, RegistryError> {
        let contracts = self.load()?;
        Ok(contracts
            .get_recent_records(limit)
            .into_iter()
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ContractRegistry for RegistryStore {
    async fn register(&self, registration: &Registration) -> Result<(), RegistryError> {
        let mut contracts = self.load()?;
        contracts.add_record(registration.clone());
        self.save(&contracts)?;
        info!(
            "Registered {} as {} in {}",
            registration.contract_id,
            registration.contract_name,
            self.registry_file.display()
        );
        Ok(())
    }
}
