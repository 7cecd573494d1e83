use serde::{Deserialize, Serialize};

/// Main configuration structure for changeward
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Change buffer (debounce) configuration
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Proposal trigger thresholds
    #[serde(default)]
    pub threshold: ThresholdConfig,

    /// Session matching and staleness configuration
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Idempotency record configuration
    #[serde(default)]
    pub idempotency: IdempotencyConfig,

    /// Scoring engine configuration
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Version control configuration
    #[serde(default)]
    pub vcs: VcsConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Background worker configuration
    #[serde(default)]
    pub workers: WorkerConfig,
}

/// Change buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BufferConfig {
    /// Idle time after the last event before a flush
    #[serde(default = "default_debounce_seconds")]
    pub debounce_seconds: u64,

    /// Absolute limit since the first buffered event
    #[serde(default = "default_buffer_max_wait_seconds")]
    pub max_wait_seconds: u64,

    /// Flush as soon as this many events are buffered
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

const fn default_debounce_seconds() -> u64 {
    5
}

const fn default_buffer_max_wait_seconds() -> u64 {
    60
}

const fn default_batch_size() -> usize {
    50
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            debounce_seconds: default_debounce_seconds(),
            max_wait_seconds: default_buffer_max_wait_seconds(),
            batch_size: default_batch_size(),
        }
    }
}

/// Proposal trigger thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ThresholdConfig {
    #[serde(default = "default_min_files")]
    pub min_files: usize,

    #[serde(default = "default_min_lines")]
    pub min_lines: u64,

    /// Session age after which a proposal is created regardless of size
    #[serde(default = "default_threshold_max_wait_seconds")]
    pub max_wait_seconds: u64,
}

const fn default_min_files() -> usize {
    3
}

const fn default_min_lines() -> u64 {
    50
}

const fn default_threshold_max_wait_seconds() -> u64 {
    1800
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_files: default_min_files(),
            min_lines: default_min_lines(),
            max_wait_seconds: default_threshold_max_wait_seconds(),
        }
    }
}

/// Session matching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkflowConfig {
    /// Maximum gap since a session's last activity for temporal matching
    #[serde(default = "default_match_window_seconds")]
    pub match_window_seconds: u64,

    /// Sessions idle for longer than this are completed by the sweep
    #[serde(default = "default_stale_after_minutes")]
    pub stale_after_minutes: u64,

    /// How often the orchestrator runs the staleness sweep
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,
}

const fn default_match_window_seconds() -> u64 {
    600
}

const fn default_stale_after_minutes() -> u64 {
    60
}

const fn default_cleanup_interval_seconds() -> u64 {
    300
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            match_window_seconds: default_match_window_seconds(),
            stale_after_minutes: default_stale_after_minutes(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
        }
    }
}

/// Idempotency configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IdempotencyConfig {
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,
}

const fn default_ttl_hours() -> i64 {
    super::idempotency::DEFAULT_TTL_HOURS
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
        }
    }
}

/// Scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScoringConfig {
    /// Minimum stabilized score for automatic approval
    #[serde(default = "default_approve_threshold")]
    pub approve_threshold: f64,

    /// Credit added for a complete compliance narrative
    #[serde(default = "default_pipeline_bonus")]
    pub pipeline_bonus: f64,

    /// Horizontal scale of the logistic stabilization curve
    #[serde(default = "default_stabilization_scale")]
    pub stabilization_scale: f64,

    /// Category weights
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryWeight>,
}

/// Weight of one named scoring category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryWeight {
    pub name: String,
    pub weight: f64,
}

const fn default_approve_threshold() -> f64 {
    7.0
}

const fn default_pipeline_bonus() -> f64 {
    2.0
}

const fn default_stabilization_scale() -> f64 {
    4.0
}

fn default_categories() -> Vec<CategoryWeight> {
    vec![
        CategoryWeight {
            name: "change_size".to_string(),
            weight: 1.0,
        },
        CategoryWeight {
            name: "test_coverage".to_string(),
            weight: 1.5,
        },
    ]
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            approve_threshold: default_approve_threshold(),
            pipeline_bonus: default_pipeline_bonus(),
            stabilization_scale: default_stabilization_scale(),
            categories: default_categories(),
        }
    }
}

impl ScoringConfig {
    /// Weight configured for a category, if any.
    pub fn weight_for(&self, name: &str) -> Option<f64> {
        self.categories.iter().find(|c| c.name == name).map(|c| c.weight)
    }
}

/// Version control configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VcsConfig {
    /// Repository working tree
    #[serde(default = "default_repo_root")]
    pub repo_root: String,

    #[serde(default = "default_remote")]
    pub remote: String,

    /// Branch change requests are opened against
    #[serde(default = "default_base_branch")]
    pub base_branch: String,

    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,

    /// Upper bound for any single git or HTTP call
    #[serde(default = "default_command_timeout_seconds")]
    pub command_timeout_seconds: u64,

    #[serde(default)]
    pub github: GitHubConfig,
}

fn default_repo_root() -> String {
    ".".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_base_branch() -> String {
    "main".to_string()
}

fn default_branch_prefix() -> String {
    "changeward/session-".to_string()
}

const fn default_command_timeout_seconds() -> u64 {
    60
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            repo_root: default_repo_root(),
            remote: default_remote(),
            base_branch: default_base_branch(),
            branch_prefix: default_branch_prefix(),
            command_timeout_seconds: default_command_timeout_seconds(),
            github: GitHubConfig::default(),
        }
    }
}

/// GitHub pull request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GitHubConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default)]
    pub owner: String,

    #[serde(default)]
    pub repo: String,

    /// Environment variable holding the API token
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            owner: String::new(),
            repo: String::new(),
            token_env: default_token_env(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".changeward/changeward.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Background worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Upper bound on concurrently running proposal jobs
    #[serde(default = "default_max_concurrent_proposals")]
    pub max_concurrent_proposals: usize,
}

const fn default_max_concurrent_proposals() -> usize {
    4
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_proposals: default_max_concurrent_proposals(),
        }
    }
}
