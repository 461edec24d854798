use core_config::{env_parse, ConfigError, FromEnv};

pub const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 5;

/// Tunables of the product service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogSettings {
    /// Read-modify-write attempts before a contended update gives up. At least 1.
    pub max_write_attempts: u32,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
        }
    }
}

impl CatalogSettings {
    pub fn with_max_write_attempts(mut self, attempts: u32) -> Self {
        self.max_write_attempts = attempts.max(1);
        self
    }
}

impl FromEnv for CatalogSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let attempts = env_parse("CATALOG_MAX_WRITE_ATTEMPTS", DEFAULT_MAX_WRITE_ATTEMPTS)?;
        Ok(Self::default().with_max_write_attempts(attempts))
    }
}
