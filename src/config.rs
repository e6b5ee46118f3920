//! Capacity constants for the file table and unit pool.
//!
//! Defaults match the classic toolkit limits.  Any field may be overridden
//! from JSON; missing fields keep their defaults:
//!
//! ```json
//! { "file_table_size": 64, "unit_pool_size": 8 }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

/// Environment variable naming a JSON configuration file.
pub const CONFIG_ENV: &str = "ARRAYFILE_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of simultaneously open files.
    pub file_table_size: usize,
    /// Maximum number of simultaneously bound OS channels.
    pub unit_pool_size: usize,
    /// Units that can never be locked.
    pub reserved_units: usize,
    /// Units kept back from general locks for scratch files.
    pub scratch_units: usize,
    /// Request clock value that triggers a counter rescale.
    pub counter_ceiling: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            file_table_size: 1000,
            unit_pool_size: 23,
            reserved_units: 2,
            scratch_units: 1,
            counter_ceiling: i32::MAX as u32,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.unit_pool_size == 0 {
            return Err(KernelError::InvalidConfig("unit_pool_size must be positive".into()));
        }
        if self.unit_pool_size >= self.file_table_size {
            return Err(KernelError::InvalidConfig(format!(
                "unit_pool_size ({}) must be smaller than file_table_size ({})",
                self.unit_pool_size, self.file_table_size
            )));
        }
        if self.reserved_units + self.scratch_units >= self.unit_pool_size {
            return Err(KernelError::InvalidConfig(format!(
                "reserved_units + scratch_units ({}) must be smaller than unit_pool_size ({})",
                self.reserved_units + self.scratch_units,
                self.unit_pool_size
            )));
        }
        let floor = 2 * self.unit_pool_size as u64 + 2;
        if (self.counter_ceiling as u64) < floor {
            return Err(KernelError::InvalidConfig(format!(
                "counter_ceiling ({}) must be at least {floor}",
                self.counter_ceiling
            )));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| KernelError::io("read config", path, e))?;
        Self::from_json(&json)
    }

    /// Configuration named by `ARRAYFILE_CONFIG`, or the defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }
}
