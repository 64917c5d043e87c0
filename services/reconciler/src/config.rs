use crate::store::LedgerTable;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PG_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_PG_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Memory,
    Postgres,
}

impl std::str::FromStr for LedgerBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "memory" => Ok(LedgerBackend::Memory),
            "postgres" => Ok(LedgerBackend::Postgres),
            other => bail!("unknown ledger backend {other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    DEFAULT_PG_MAX_CONNECTIONS
}

fn default_acquire_timeout_ms() -> u64 {
    DEFAULT_PG_ACQUIRE_TIMEOUT_MS
}

// Reconciler configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub metrics_bind: SocketAddr,
    pub ledger: LedgerTable,
    pub ledger_backend: LedgerBackend,
    pub postgres: Option<PostgresConfig>,
    pub manifest_path: Option<PathBuf>,
    pub resync_interval: Duration,
    /// Applied to specifications that leave `istio_revision` empty.
    pub default_istio_revision: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReconcilerConfigOverride {
    metrics_bind: Option<String>,
    ledger_dataset: Option<String>,
    ledger_table: Option<String>,
    ledger_backend: Option<LedgerBackend>,
    postgres: Option<PostgresConfig>,
    manifest_path: Option<PathBuf>,
    resync_secs: Option<u64>,
    default_istio_revision: Option<String>,
}

impl ReconcilerConfig {
    pub fn from_env() -> Result<Self> {
        let metrics_bind = std::env::var("TENANCY_METRICS_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .with_context(|| "parse TENANCY_METRICS_BIND")?;
        let ledger = LedgerTable {
            dataset: std::env::var("TENANCY_LEDGER_DATASET")
                .unwrap_or_else(|_| "billing".to_string()),
            table: std::env::var("TENANCY_LEDGER_TABLE")
                .unwrap_or_else(|_| "namespace_labels".to_string()),
        };
        let ledger_backend = std::env::var("TENANCY_LEDGER_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .parse()
            .with_context(|| "parse TENANCY_LEDGER_BACKEND")?;
        let postgres = match std::env::var("TENANCY_PG_URL") {
            Ok(url) => Some(PostgresConfig {
                url,
                max_connections: parse_env_or("TENANCY_PG_MAX_CONNECTIONS", DEFAULT_PG_MAX_CONNECTIONS)?,
                acquire_timeout_ms: parse_env_or(
                    "TENANCY_PG_ACQUIRE_TIMEOUT_MS",
                    DEFAULT_PG_ACQUIRE_TIMEOUT_MS,
                )?,
            }),
            Err(_) => None,
        };
        let manifest_path = std::env::var("TENANCY_MANIFEST").ok().map(PathBuf::from);
        let resync_interval = Duration::from_secs(parse_env_or("TENANCY_RESYNC_SECS", 30)?);
        let default_istio_revision = std::env::var("TENANCY_DEFAULT_ISTIO_REVISION")
            .ok()
            .filter(|value| !value.is_empty());
        Ok(Self {
            metrics_bind,
            ledger,
            ledger_backend,
            postgres,
            manifest_path,
            resync_interval,
            default_istio_revision,
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("TENANCY_RECONCILER_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read TENANCY_RECONCILER_CONFIG: {path}"))?;
            let override_cfg: ReconcilerConfigOverride = serde_yaml::from_str(&contents)
                .with_context(|| "parse reconciler config yaml")?;
            config.apply(override_cfg)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, override_cfg: ReconcilerConfigOverride) -> Result<()> {
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.ledger_dataset {
            self.ledger.dataset = value;
        }
        if let Some(value) = override_cfg.ledger_table {
            self.ledger.table = value;
        }
        if let Some(value) = override_cfg.ledger_backend {
            self.ledger_backend = value;
        }
        if let Some(value) = override_cfg.postgres {
            self.postgres = Some(value);
        }
        if let Some(value) = override_cfg.manifest_path {
            self.manifest_path = Some(value);
        }
        if let Some(value) = override_cfg.resync_secs {
            self.resync_interval = Duration::from_secs(value);
        }
        if let Some(value) = override_cfg.default_istio_revision {
            self.default_istio_revision = Some(value);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.ledger_backend == LedgerBackend::Postgres && self.postgres.is_none() {
            bail!("ledger backend postgres requires TENANCY_PG_URL or a postgres section");
        }
        if self.resync_interval.is_zero() {
            bail!("resync interval must be positive");
        }
        Ok(())
    }
}

fn parse_env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value.parse().with_context(|| format!("parse {key}")),
        Err(_) => Ok(default),
    }
}
