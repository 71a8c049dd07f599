use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub broker: BrokerConfig,
    pub docstore: DocStoreConfig,
    pub index: IndexConfig,
    pub blob: BlobConfig,
    pub supervisor: SupervisorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    pub user_agent: String,
    pub max_depth: u32,
    pub default_politeness_seconds: f64,
    pub max_body_size_mb: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrokerConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocStoreConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BlobConfig {
    pub url: String,
    pub bucket: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SupervisorConfig {
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    #[serde(default = "default_stale_scan_interval")]
    pub stale_scan_interval_seconds: u64,
    #[serde(default = "default_stale_after")]
    pub stale_after_seconds: u64,
}

fn default_heartbeat_interval() -> u64 {
    10
}
fn default_stale_scan_interval() -> u64 {
    300
}
fn default_stale_after() -> u64 {
    3600
}
