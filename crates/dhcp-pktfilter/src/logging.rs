//! `tracing` subscriber setup for processes embedding the packet filter.

use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

static RELOAD: OnceCell<reload::Handle<EnvFilter, Registry>> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    /// `EnvFilter` directives, e.g. `info` or `dhcp_pktfilter=trace`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Defaults overridden by `RAWDHCP_LOG` (directives, or `off`).
    pub fn from_env() -> Self {
        match std::env::var("RAWDHCP_LOG") {
            Ok(v) if v.trim().eq_ignore_ascii_case("off") => Self {
                enabled: false,
                ..Self::default()
            },
            Ok(v) if !v.trim().is_empty() => Self {
                enabled: true,
                level: v.trim().to_string(),
            },
            _ => Self::default(),
        }
    }
}

/// Install a compact stdout subscriber with a reloadable filter. A second
/// call, or a subscriber installed by the host process, leaves the existing
/// one in place.
pub fn init(cfg: &LoggingConfig) -> Result<()> {
    let (filter_layer, handle) = reload::Layer::new(build_filter(cfg));
    let _ = RELOAD.set(handle);

    let stdout_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .compact();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .try_init()
        .ok();
    Ok(())
}

/// Swap the active filter for one built from `cfg`.
pub fn apply(cfg: &LoggingConfig) -> Result<()> {
    let handle = RELOAD
        .get()
        .ok_or_else(|| anyhow::anyhow!("logging not initialized"))?;
    handle.reload(build_filter(cfg))?;
    Ok(())
}

fn build_filter(cfg: &LoggingConfig) -> EnvFilter {
    if !cfg.enabled {
        return EnvFilter::new("off");
    }
    EnvFilter::try_new(&cfg.level).unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_build_filter() {
        let off = LoggingConfig {
            enabled: false,
            level: "trace".to_string(),
        };
        assert_eq!(build_filter(&off).max_level_hint(), Some(LevelFilter::OFF));

        let debug = LoggingConfig {
            enabled: true,
            level: "debug".to_string(),
        };
        assert_eq!(build_filter(&debug).max_level_hint(), Some(LevelFilter::DEBUG));

        let bogus = LoggingConfig {
            enabled: true,
            level: "dhcp_pktfilter=loud".to_string(),
        };
        assert_eq!(build_filter(&bogus).max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn test_init_then_apply() {
        init(&LoggingConfig::default()).unwrap();
        init(&LoggingConfig::default()).unwrap();
        apply(&LoggingConfig {
            enabled: true,
            level: "warn".to_string(),
        })
        .unwrap();
    }
}
