use std::{collections::HashMap, path::PathBuf};

use crate::{
    engine::{OptimizeOptions, VacuumOptions, WriteOptions},
    error::LakeError,
};

/// Default compaction target: 512 MiB.
pub const DEFAULT_TARGET_SIZE: u64 = 512 * 1024 * 1024;
/// Default vacuum retention window: one week.
pub const DEFAULT_RETENTION_HOURS: u64 = 168;

/// Configuration of a [`LakeManager`](crate::LakeManager).
#[derive(Debug, Clone)]
pub struct LakeOptions {
    pub(crate) base_path: PathBuf,
    pub(crate) storage_options: HashMap<String, String>,
    pub(crate) default_target_size: u64,
    pub(crate) default_retention_hours: u64,
    pub(crate) enforce_retention_duration: bool,
    pub(crate) write_options: WriteOptions,
}

impl<P> From<P> for LakeOptions
where
    P: Into<PathBuf>,
{
    fn from(path: P) -> Self {
        LakeOptions {
            base_path: path.into(),
            storage_options: HashMap::new(),
            default_target_size: DEFAULT_TARGET_SIZE,
            default_retention_hours: DEFAULT_RETENTION_HOURS,
            enforce_retention_duration: false,
            write_options: WriteOptions::default(),
        }
    }
}

impl LakeOptions {
    /// Root directory of the lake.
    pub fn base_path(self, base_path: impl Into<PathBuf>) -> Self {
        LakeOptions {
            base_path: base_path.into(),
            ..self
        }
    }

    /// Options handed to the engine's object store, e.g. credentials.
    pub fn storage_options(self, storage_options: HashMap<String, String>) -> Self {
        LakeOptions {
            storage_options,
            ..self
        }
    }

    /// Add one object-store option.
    pub fn storage_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.storage_options.insert(key.into(), value.into());
        self
    }

    /// Compaction target used when an optimize names none.
    pub fn default_target_size(self, default_target_size: u64) -> Self {
        LakeOptions {
            default_target_size,
            ..self
        }
    }

    /// Vacuum retention used when a vacuum names none.
    pub fn default_retention_hours(self, default_retention_hours: u64) -> Self {
        LakeOptions {
            default_retention_hours,
            ..self
        }
    }

    /// Whether default vacuums enforce the engine's minimum retention.
    pub fn enforce_retention_duration(self, enforce_retention_duration: bool) -> Self {
        LakeOptions {
            enforce_retention_duration,
            ..self
        }
    }

    /// Write options used when a write call passes none.
    pub fn write_options(self, write_options: WriteOptions) -> Self {
        LakeOptions {
            write_options,
            ..self
        }
    }
}

impl LakeOptions {
    pub(crate) fn validate(&self) -> Result<(), LakeError> {
        if self.base_path.as_os_str().to_string_lossy().trim().is_empty() {
            return Err(LakeError::InvalidBasePath);
        }
        Ok(())
    }

    pub(crate) fn optimize_options(&self, options: Option<OptimizeOptions>) -> OptimizeOptions {
        let mut options = options.unwrap_or_default();
        options.target_size = options.target_size.or(Some(self.default_target_size));
        options
    }

    pub(crate) fn vacuum_options(&self, options: Option<VacuumOptions>) -> VacuumOptions {
        options.unwrap_or(VacuumOptions {
            retention_hours: Some(self.default_retention_hours),
            enforce_retention_duration: self.enforce_retention_duration,
        })
    }
}
