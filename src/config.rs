//! Engine configuration (§6).
//!
//! Mirrors the teacher's small typed config structs (`StorageConfig`,
//! `EmbeddingConfig`) rather than one monolithic settings blob: each
//! subsystem owns its slice, and [`Configuration`] composes them.

use serde::{Deserialize, Serialize};

/// Store-context performance tracking knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PerformanceConfig {
    #[serde(default = "default_slow_query_threshold_ms")]
    pub slow_query_threshold_ms: u64,
    #[serde(default = "default_max_slow_query_history")]
    pub max_slow_query_history: usize,
    #[serde(default = "default_collection_interval_ms")]
    pub collection_interval_ms: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold_ms: default_slow_query_threshold_ms(),
            max_slow_query_history: default_max_slow_query_history(),
            collection_interval_ms: default_collection_interval_ms(),
            enabled: true,
        }
    }
}

/// Consolidation engine scheduler knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ConsolidationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_max_consolidations_per_run")]
    pub max_consolidations_per_run: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default)]
    pub dry_run: bool,
    /// Variance threshold for conflict detection (§9.1 Open Question c).
    #[serde(default = "default_conflict_confidence_variance")]
    pub conflict_confidence_variance: f64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: default_interval_minutes(),
            max_consolidations_per_run: default_max_consolidations_per_run(),
            similarity_threshold: default_similarity_threshold(),
            dry_run: false,
            conflict_confidence_variance: default_conflict_confidence_variance(),
        }
    }
}

/// State manager knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct StateManagerConfig {
    #[serde(default = "default_true")]
    pub enable_history_tracking: bool,
    #[serde(default = "default_true")]
    pub enable_metrics: bool,
    #[serde(default = "default_max_history_entries")]
    pub max_history_entries: usize,
}

impl Default for StateManagerConfig {
    fn default() -> Self {
        Self {
            enable_history_tracking: true,
            enable_metrics: true,
            max_history_entries: default_max_history_entries(),
        }
    }
}

/// FTS/backup maintenance scheduler knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct MaintenanceConfig {
    #[serde(default = "default_health_check_ms")]
    pub health_check_ms: u64,
    #[serde(default = "default_optimization_check_ms")]
    pub optimization_check_ms: u64,
    #[serde(default = "default_backup_ms")]
    pub backup_ms: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            health_check_ms: default_health_check_ms(),
            optimization_check_ms: default_optimization_check_ms(),
            backup_ms: default_backup_ms(),
        }
    }
}

/// Top-level engine configuration (§6). Unknown top-level keys are rejected
/// by `#[serde(deny_unknown_fields)]` at deserialization time, satisfying
/// "unknown keys rejected at load".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Configuration {
    pub database_url: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub conscious_ingest: bool,
    #[serde(default = "default_true")]
    pub auto_ingest: bool,
    #[serde(default = "default_true")]
    pub enable_relationship_extraction: bool,
    pub user_context: Option<String>,
    pub background_update_interval: Option<u64>,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub consolidation: ConsolidationConfig,
    #[serde(default)]
    pub state_manager: StateManagerConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    /// Maximum content length accepted by the Memory Manager (§4.3).
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
    /// Maximum number of relationships stored per record (§4.4).
    #[serde(default = "default_max_relationships_per_memory")]
    pub max_relationships_per_memory: usize,
}

impl Configuration {
    /// Build the minimal configuration needed to open an in-memory engine,
    /// used throughout tests.
    pub fn in_memory() -> Self {
        Self {
            database_url: ":memory:".to_string(),
            namespace: default_namespace(),
            conscious_ingest: false,
            auto_ingest: true,
            enable_relationship_extraction: true,
            user_context: None,
            background_update_interval: None,
            performance: PerformanceConfig::default(),
            consolidation: ConsolidationConfig::default(),
            state_manager: StateManagerConfig::default(),
            maintenance: MaintenanceConfig::default(),
            max_content_length: default_max_content_length(),
            max_relationships_per_memory: default_max_relationships_per_memory(),
        }
    }

    /// Validate cross-field constraints that `serde` alone cannot express.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(crate::error::MemoryError::Config(
                "databaseUrl must not be empty".into(),
            ));
        }
        if self.namespace.trim().is_empty() {
            return Err(crate::error::MemoryError::Config(
                "namespace must not be empty".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.consolidation.similarity_threshold) {
            return Err(crate::error::MemoryError::Config(
                "consolidation.similarityThreshold must be in [0,1]".into(),
            ));
        }
        if self.max_content_length == 0 {
            return Err(crate::error::MemoryError::Config(
                "maxContentLength must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn default_namespace() -> String {
    "default".to_string()
}
fn default_true() -> bool {
    true
}
fn default_slow_query_threshold_ms() -> u64 {
    100
}
fn default_max_slow_query_history() -> usize {
    200
}
fn default_collection_interval_ms() -> u64 {
    60_000
}
fn default_interval_minutes() -> u64 {
    60
}
fn default_max_consolidations_per_run() -> usize {
    20
}
fn default_similarity_threshold() -> f64 {
    0.7
}
fn default_conflict_confidence_variance() -> f64 {
    0.5
}
fn default_max_history_entries() -> usize {
    100
}
fn default_health_check_ms() -> u64 {
    3_600_000
}
fn default_optimization_check_ms() -> u64 {
    86_400_000
}
fn default_backup_ms() -> u64 {
    604_800_000
}
fn default_max_content_length() -> usize {
    32_768
}
fn default_max_relationships_per_memory() -> usize {
    200
}
