//! Build configuration for the bonded-force kernel.

use serde::{Deserialize, Serialize};

use crate::error::{BondedError, Result};

/// Kernel build settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BondedConfig {
    /// Threads per workgroup; a power of two in 1..=1024.
    pub workgroup_size: u32,
    /// Upper bound on workgroups per dispatch.
    pub max_workgroups: u32,
    /// Kernel entry-point name.
    pub entry_point: String,
    /// Label for the shader module and its buffers.
    pub label: String,
}

impl Default for BondedConfig {
    fn default() -> Self {
        Self {
            workgroup_size: 64,
            max_workgroups: 65535,
            entry_point: "compute_bonded_forces".to_string(),
            label: "bonded_forces".to_string(),
        }
    }
}

impl BondedConfig {
    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: BondedConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=1024).contains(&self.workgroup_size) || !self.workgroup_size.is_power_of_two() {
            return Err(BondedError::InvalidConfig(format!(
                "workgroup_size must be a power of two in 1..=1024, got {}",
                self.workgroup_size
            )));
        }
        if self.max_workgroups == 0 {
            return Err(BondedError::InvalidConfig(
                "max_workgroups must be at least 1".to_string(),
            ));
        }
        bonded_codegen::validate_identifier(&self.entry_point)
            .map_err(|e| BondedError::InvalidConfig(e.to_string()))?;
        Ok(())
    }

    /// Workgroups needed to give every tuple of the largest term a thread.
    pub fn workgroups_for(&self, max_tuple_count: usize) -> u32 {
        let needed = max_tuple_count.div_ceil(self.workgroup_size as usize);
        needed.clamp(1, self.max_workgroups as usize) as u32
    }

    /// Threads launched per dispatch for `max_tuple_count`.
    pub fn threads_for(&self, max_tuple_count: usize) -> usize {
        self.workgroups_for(max_tuple_count) as usize * self.workgroup_size as usize
    }
}
