//! Startup configuration read from the environment

use anyhow::Context;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to (`AIRGUARD_ADDR`)
    pub addr: SocketAddr,
    /// Directory for persisted rules and tasks (`DATA_DIR`)
    pub data_dir: PathBuf,
    /// Rule evaluation period (`RULE_TICK_MS`)
    pub rule_tick: Duration,
    /// Scheduler check period (`SCHEDULE_TICK_MS`)
    pub schedule_tick: Duration,
}

impl Config {
    /// Read configuration from environment variables, falling back to defaults
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let addr = lookup("AIRGUARD_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .context("AIRGUARD_ADDR must be a socket address like 0.0.0.0:3000")?;
        let data_dir = PathBuf::from(lookup("DATA_DIR").unwrap_or_else(|| "./data".to_string()));
        let rule_tick = millis(&lookup, "RULE_TICK_MS", 2000)?;
        let schedule_tick = millis(&lookup, "SCHEDULE_TICK_MS", 1000)?;

        Ok(Self {
            addr,
            data_dir,
            rule_tick,
            schedule_tick,
        })
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> anyhow::Result<Duration> {
    let Some(raw) = lookup(key) else {
        return Ok(Duration::from_millis(default));
    };
    let ms: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a whole number of milliseconds, got {raw:?}"))?;
    anyhow::ensure!(ms > 0, "{key} must be greater than zero");
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.addr.port(), 3000);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.rule_tick, Duration::from_secs(2));
        assert_eq!(config.schedule_tick, Duration::from_secs(1));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[("AIRGUARD_ADDR", "127.0.0.1:8080"), ("RULE_TICK_MS", "500")]).unwrap();
        assert_eq!(config.addr.port(), 8080);
        assert_eq!(config.rule_tick, Duration::from_millis(500));
    }

    #[test]
    fn test_invalid_values() {
        assert!(config(&[("AIRGUARD_ADDR", "localhost")]).is_err());
        assert!(config(&[("SCHEDULE_TICK_MS", "soon")]).is_err());
        assert!(config(&[("RULE_TICK_MS", "0")]).is_err());
    }
}
