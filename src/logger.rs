use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt};

use crate::config::{ConfigManager, LOG_DIR_KEY, LOG_LEVEL_KEY};
use crate::engine::FLOW_EVENT_TARGET;

pub const LOG_FILE: &str = "convoflow.log";
pub const EVENT_FILE: &str = "convoflow-events.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// An `EnvFilter` directive, e.g. `info` or `convoflow=debug`.
    pub log_level: String,
    /// When set, logs go to daily rolling files here instead of stderr.
    pub log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl LogConfig {
    pub fn new(log_level: impl Into<String>, log_dir: Option<PathBuf>) -> Self {
        Self {
            log_level: log_level.into(),
            log_dir,
        }
    }

    pub async fn load(config: &ConfigManager) -> Self {
        let defaults = Self::default();
        Self {
            log_level: config.get(LOG_LEVEL_KEY).await.unwrap_or(defaults.log_level),
            log_dir: config.get(LOG_DIR_KEY).await.map(PathBuf::from),
        }
    }

    fn filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_new(&self.log_level).with_context(|| format!("invalid log level `{}`", self.log_level))
    }
}

/// Installs the global subscriber.
///
/// Without a log dir, human-readable logs go to stderr so stdout stays free
/// for command output. With one, a daily rolling text log is written next to
/// a JSON log holding only the per-invocation `flow_event` lines.
pub fn init_tracing(config: &LogConfig) -> Result<()> {
    let env_filter = config.filter()?;

    match &config.log_dir {
        None => {
            let fmt_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
            Registry::default()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
                .context("tracing already initialised")?;
        }
        Some(dir) => {
            std::fs::create_dir_all(dir).with_context(|| format!("could not create log dir {}", dir.display()))?;

            let txt_appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE);
            let txt_layer = fmt::layer().with_writer(txt_appender).with_ansi(false);

            let json_appender = RollingFileAppender::new(Rotation::DAILY, dir, EVENT_FILE);
            let json_layer = fmt::layer()
                .json()
                .with_writer(json_appender)
                .with_target(true)
                .with_filter(EnvFilter::new(format!("{}=info", FLOW_EVENT_TARGET)));

            Registry::default()
                .with(env_filter)
                .with(txt_layer)
                .with(json_layer)
                .try_init()
                .context("tracing already initialised")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_from_config() {
        let cfg = LogConfig::load(&ConfigManager::map(&[(LOG_LEVEL_KEY, "debug"), (LOG_DIR_KEY, "/tmp/convoflow-logs")])).await;
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.log_dir, Some(PathBuf::from("/tmp/convoflow-logs")));

        let cfg = LogConfig::load(&ConfigManager::map(&[])).await;
        assert_eq!(cfg, LogConfig::default());
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        let cfg = LogConfig::new("convoflow=loud", None);
        assert!(init_tracing(&cfg).is_err());
    }
}
