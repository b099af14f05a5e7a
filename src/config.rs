use std::path::PathBuf;
use std::time::Duration;
use std::{env, fmt};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{info, warn};
use url::Url;

use crate::error::ConfigError;
use crate::session::DEFAULT_SUSPENSION_TTL;

pub const SUSPENSION_TTL_KEY: &str = "FLOW_SUSPENSION_TTL_SECS";
pub const PREMIUM_TIERS_KEY: &str = "FLOW_PREMIUM_TIERS";
pub const REDIS_URL_KEY: &str = "REDIS_URL";
pub const OLLAMA_URL_KEY: &str = "OLLAMA_URL";
pub const OLLAMA_MODEL_KEY: &str = "OLLAMA_MODEL";
pub const LOG_LEVEL_KEY: &str = "LOG_LEVEL";
pub const LOG_DIR_KEY: &str = "LOG_DIR";

/// Plan tiers that satisfy `is_premium` unless configured otherwise.
pub const DEFAULT_PREMIUM_TIERS: [&str; 2] = ["pro", "enterprise"];

/// Source of string settings.
#[async_trait]
pub trait ConfigManagerType: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn del(&self, key: &str);
    async fn set(&self, key: &str, value: &str) -> Result<(), ConfigError>;
    fn clone_box(&self) -> Box<dyn ConfigManagerType>;
    fn debug_box(&self) -> String;
}

pub struct ConfigManager(pub Box<dyn ConfigManagerType>);

impl ConfigManager {
    pub fn env(env_file: Option<PathBuf>) -> Self {
        ConfigManager(EnvConfigManager::new(env_file))
    }

    pub fn map(entries: &[(&str, &str)]) -> Self {
        let mgr = MapConfigManager::new();
        for (k, v) in entries {
            mgr.map.insert(k.to_string(), v.to_string());
        }
        ConfigManager(mgr)
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.0
            .get(key)
            .await
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

impl Clone for ConfigManager {
    fn clone(&self) -> Self {
        ConfigManager(self.0.clone_box())
    }
}

impl fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.debug_box())
    }
}

/// Reads the process environment, optionally seeded from a `.env` file.
/// `set` and `del` only touch the running process.
#[derive(Clone, Debug)]
pub struct EnvConfigManager {
    env_file: Option<PathBuf>,
}

impl EnvConfigManager {
    pub fn new(env_file: Option<PathBuf>) -> Box<Self> {
        match &env_file {
            Some(path) if path.exists() => {
                dotenvy::from_path(path).ok();
                info!("Loaded .env from {}", path.display());
            }
            Some(path) => warn!("could not load .env from {}", path.display()),
            None => {
                if let Ok(path) = dotenvy::dotenv() {
                    info!("Loaded .env from {}", path.display());
                }
            }
        }
        Box::new(Self { env_file })
    }
}

#[async_trait]
impl ConfigManagerType for EnvConfigManager {
    async fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        if key.is_empty() || key.contains('=') || key.contains('\0') {
            return Err(ConfigError::Backend(format!("invalid variable name `{key}`")));
        }
        unsafe {
            env::set_var(key, value);
        };
        Ok(())
    }

    async fn del(&self, key: &str) {
        unsafe {
            env::remove_var(key);
        };
    }

    fn clone_box(&self) -> Box<dyn ConfigManagerType> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        match &self.env_file {
            Some(path) => format!("EnvConfigManager({})", path.display()),
            None => "EnvConfigManager".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MapConfigManager {
    map: DashMap<String, String>,
}

impl MapConfigManager {
    pub fn new() -> Box<Self> {
        Box::new(Self {
            map: DashMap::new(),
        })
    }
}

#[async_trait]
impl ConfigManagerType for MapConfigManager {
    async fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).map(|v| v.clone())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) {
        self.map.remove(key);
    }

    fn clone_box(&self) -> Box<dyn ConfigManagerType> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        format!("MapConfigManager({} entries)", self.map.len())
    }
}

/// Settings the engine and its adapters read at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub suspension_ttl: Duration,
    /// Lower-cased plan tiers for which `is_premium` holds.
    pub premium_tiers: Vec<String>,
    pub redis_url: Option<String>,
    pub ollama_url: Option<Url>,
    pub ollama_model: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            suspension_ttl: DEFAULT_SUSPENSION_TTL,
            premium_tiers: DEFAULT_PREMIUM_TIERS.iter().map(|t| t.to_string()).collect(),
            redis_url: None,
            ollama_url: None,
            ollama_model: None,
        }
    }
}

impl EngineConfig {
    pub async fn load(config: &ConfigManager) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(raw) = config.get(SUSPENSION_TTL_KEY).await {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: SUSPENSION_TTL_KEY.to_string(),
                value: raw.clone(),
            })?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: SUSPENSION_TTL_KEY.to_string(),
                    value: raw,
                });
            }
            cfg.suspension_ttl = Duration::from_secs(secs);
        }

        if let Some(raw) = config.get(PREMIUM_TIERS_KEY).await {
            cfg.premium_tiers = parse_tiers(&raw);
        }

        cfg.redis_url = config.get(REDIS_URL_KEY).await;

        if let Some(raw) = config.get(OLLAMA_URL_KEY).await {
            let url = Url::parse(&raw).map_err(|_| ConfigError::InvalidValue {
                key: OLLAMA_URL_KEY.to_string(),
                value: raw.clone(),
            })?;
            cfg.ollama_url = Some(url);
        }
        cfg.ollama_model = config.get(OLLAMA_MODEL_KEY).await;

        Ok(cfg)
    }

    pub fn with_suspension_ttl(mut self, ttl: Duration) -> Self {
        self.suspension_ttl = ttl;
        self
    }

    pub fn with_premium_tiers<I, S>(mut self, tiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.premium_tiers = tiers
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    pub fn is_premium(&self, plan_tier: &str) -> bool {
        let tier = plan_tier.trim().to_lowercase();
        self.premium_tiers.iter().any(|t| *t == tier)
    }
}

fn parse_tiers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::write;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_map_config_manager_basic() {
        let mgr = MapConfigManager::new();

        mgr.set("foo", "bar").await.unwrap();
        assert_eq!(mgr.get("foo").await, Some("bar".to_string()));

        mgr.set("foo", "baz").await.unwrap();
        assert_eq!(mgr.get("foo").await, Some("baz".to_string()));

        mgr.del("foo").await;
        assert_eq!(mgr.get("foo").await, None);
    }

    #[tokio::test]
    async fn test_env_config_manager_with_temp_env_file() {
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        write(&env_path, "CONVOFLOW_TEST_MODEL=mistral\n").unwrap();

        let mgr = ConfigManager::env(Some(env_path));
        assert_eq!(mgr.get("CONVOFLOW_TEST_MODEL").await, Some("mistral".to_string()));

        mgr.0.del("CONVOFLOW_TEST_MODEL").await;
        assert_eq!(mgr.get("CONVOFLOW_TEST_MODEL").await, None);
    }

    #[tokio::test]
    async fn test_engine_config_defaults() {
        let cfg = EngineConfig::load(&ConfigManager::map(&[])).await.unwrap();
        assert_eq!(cfg.suspension_ttl, Duration::from_secs(3600));
        assert!(cfg.is_premium("pro"));
        assert!(cfg.is_premium(" Enterprise "));
        assert!(!cfg.is_premium("free"));
        assert!(cfg.redis_url.is_none());
    }

    #[tokio::test]
    async fn test_engine_config_overrides() {
        let mgr = ConfigManager::map(&[
            (SUSPENSION_TTL_KEY, "120"),
            (PREMIUM_TIERS_KEY, "Gold, platinum,,"),
            (REDIS_URL_KEY, "redis://localhost:6379"),
            (OLLAMA_URL_KEY, "http://ollama:11434"),
            (OLLAMA_MODEL_KEY, " "),
        ]);
        let cfg = EngineConfig::load(&mgr).await.unwrap();
        assert_eq!(cfg.suspension_ttl, Duration::from_secs(120));
        assert_eq!(cfg.premium_tiers, vec!["gold", "platinum"]);
        assert!(!cfg.is_premium("pro"));
        assert_eq!(cfg.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert_eq!(cfg.ollama_url.unwrap().port(), Some(11434));
        assert!(cfg.ollama_model.is_none());
    }

    #[tokio::test]
    async fn test_engine_config_rejects_bad_ttl() {
        for bad in ["abc", "0", "-5"] {
            let mgr = ConfigManager::map(&[(SUSPENSION_TTL_KEY, bad)]);
            let err = EngineConfig::load(&mgr).await.unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { .. }), "{bad}");
        }
    }
}
