//! Engine configuration and base-directory resolution.

use std::path::{Path, PathBuf};

use crate::error::{Result, SmaqError};
use crate::policy::PolicyConfig;

/// Environment variable overriding the artifact/stats directory.
pub const SMA_DIR_ENV: &str = "SMAQ_SMA_DIR";

/// Configuration for [`crate::engine::SmaEngine`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Directory holding `.sma` artifacts and `stats.json`. Resolved via
    /// [`EngineConfig::resolve_base_dir`] when unset.
    pub base_dir: Option<PathBuf>,
    /// Economic model constants.
    pub policy: PolicyConfig,
    /// Memory limit for DuckDB (e.g., "4GB").
    pub memory_limit: Option<String>,
}

impl EngineConfig {
    pub fn with_base_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(dir.into()),
            ..Default::default()
        }
    }

    /// Resolution order: explicit setting, then `SMAQ_SMA_DIR`, then the
    /// platform cache directory.
    pub fn resolve_base_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.base_dir {
            return Ok(dir.clone());
        }
        if let Ok(dir) = std::env::var(SMA_DIR_ENV) {
            if !dir.is_empty() {
                return Ok(PathBuf::from(dir));
            }
        }
        let base = dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
            .ok_or_else(|| SmaqError::Config("could not determine cache directory".to_string()))?;
        Ok(base.join("smaq").join("sma"))
    }
}

/// Load policy constants from a YAML file; absent fields keep defaults.
pub fn load_policy(path: &Path) -> Result<PolicyConfig> {
    let content = std::fs::read_to_string(path).map_err(|err| {
        SmaqError::Config(format!("cannot read policy file {}: {}", path.display(), err))
    })?;
    serde_yaml_ng::from_str(&content).map_err(|err| {
        SmaqError::Config(format!("invalid policy file {}: {}", path.display(), err))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_base_dir_wins() {
        let config = EngineConfig::with_base_dir("/tmp/sma-test");
        assert_eq!(
            config.resolve_base_dir().unwrap(),
            PathBuf::from("/tmp/sma-test")
        );
    }

    #[test]
    fn test_load_policy_overrides_subset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policy.yaml");
        fs::write(&path, "deposit_factor: 0.25\nrecency_window: 3\n").unwrap();
        let policy = load_policy(&path).unwrap();
        assert_eq!(policy.deposit_factor, 0.25);
        assert_eq!(policy.recency_window, 3);
        assert_eq!(policy.reinvest_factor, 0.5);
    }

    #[test]
    fn test_load_policy_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(load_policy(&dir.path().join("absent.yaml")).is_err());
    }
}
