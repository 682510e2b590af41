//! Sidecar configuration
//!
//! Defaults, then an optional TOML file, then `LIQCAP__`-prefixed environment
//! variables (`LIQCAP__SCHEDULER__MODE=per_trigger`).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use liqcap_core::{PricingConfig, SchedulerConfig};

pub const ENV_PREFIX: &str = "LIQCAP";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    pub pricing: PricingConfig,
    pub scheduler: SchedulerConfig,
    /// Used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            pricing: PricingConfig::default(),
            scheduler: SchedulerConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl SidecarConfig {
    /// Loads the layered configuration. A given `path` must exist, and every
    /// configured precision must give a representable scaling factor.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config
            .pricing
            .validate()
            .map_err(|e| ConfigError::Message(format!("pricing.token_precisions: {e}")))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liqcap_core::SchedulingMode;
    use std::time::Duration;

    #[test]
    fn test_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("liqcap-settings-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
log_filter = "debug"

[pricing]
default_quote_denom = "uusdc"
worker_min_pool_liquidity_cap = 50

[pricing.token_precisions]
uosmo = 6

[scheduler]
mode = "per_trigger"
"#,
        )
        .unwrap();

        let cfg = SidecarConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(cfg.log_filter, "debug");
        assert_eq!(cfg.pricing.default_quote_denom, "uusdc");
        assert_eq!(cfg.pricing.worker_min_pool_liquidity_cap, 50);
        assert_eq!(cfg.pricing.token_precisions["uosmo"], 6);
        assert_eq!(cfg.scheduler.mode, SchedulingMode::PerTrigger);
        assert_eq!(cfg.scheduler.cycle_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_unrepresentable_precision_is_rejected() {
        let path = std::env::temp_dir().join(format!("liqcap-precision-{}.toml", std::process::id()));
        std::fs::write(&path, "[pricing.token_precisions]\nbogus = 60\n").unwrap();

        let result = SidecarConfig::load(Some(&path));
        std::fs::remove_file(&path).ok();

        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::Message(_)));
        assert!(err.to_string().contains("60"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let path = std::env::temp_dir().join("liqcap-settings-does-not-exist.toml");
        assert!(SidecarConfig::load(Some(&path)).is_err());
    }
}
