use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub scoring: ScoringConfig,
    pub ledger: LedgerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Prefix for the /ingest and /attestations routes; /health is never prefixed
    pub api_prefix: String,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringBackend {
    Heuristic,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub backend: ScoringBackend,
    /// Model-serving URL, required for the http backend
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Sqlite,
    Http,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    pub database_path: String,
    /// Ledger gateway URL, required for the http backend
    pub endpoint: Option<String>,
    pub lookup_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
            api_prefix: "/api".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            backend: ScoringBackend::Heuristic,
            endpoint: None,
            timeout_ms: 5_000,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Sqlite,
            database_path: "/var/lib/phishguard/attestations.db".to_string(),
            endpoint: None,
            lookup_timeout_ms: 3_000,
            write_timeout_ms: 15_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ScoringConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl LedgerConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scoring.timeout_ms == 0 {
            anyhow::bail!("scoring.timeout_ms must be greater than zero");
        }
        if self.ledger.lookup_timeout_ms == 0 || self.ledger.write_timeout_ms == 0 {
            anyhow::bail!("ledger timeouts must be greater than zero");
        }
        if self.server.max_body_bytes == 0 {
            anyhow::bail!("server.max_body_bytes must be greater than zero");
        }
        if !self.server.api_prefix.is_empty() && !self.server.api_prefix.starts_with('/') {
            anyhow::bail!("server.api_prefix must start with '/'");
        }

        if self.scoring.backend == ScoringBackend::Http {
            check_endpoint("scoring.endpoint", self.scoring.endpoint.as_deref())?;
        }
        match self.ledger.backend {
            LedgerBackend::Http => {
                check_endpoint("ledger.endpoint", self.ledger.endpoint.as_deref())?;
            }
            LedgerBackend::Sqlite if self.ledger.database_path.trim().is_empty() => {
                anyhow::bail!("ledger.database_path is required for the sqlite backend");
            }
            _ => {}
        }

        Ok(())
    }
}

fn check_endpoint(field: &str, endpoint: Option<&str>) -> anyhow::Result<()> {
    let endpoint = endpoint.ok_or_else(|| anyhow::anyhow!("{field} is required"))?;
    let url = Url::parse(endpoint).map_err(|e| anyhow::anyhow!("{field}: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("{field} must be an http(s) URL");
    }
    Ok(())
}
