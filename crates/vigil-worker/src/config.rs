//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use vigil_media::{PreprocessConfig, MIN_SAMPLE_INTERVAL};

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum media units processed concurrently
    pub max_concurrent_jobs: usize,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How often to scan for entries orphaned by crashed workers
    pub claim_interval: Duration,
    /// Minimum idle time before a pending entry can be claimed
    pub claim_min_idle: Duration,
    /// How long one stream read blocks
    pub consume_block: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            shutdown_timeout: Duration::from_secs(30),
            claim_interval: Duration::from_secs(30),
            // Must exceed the longest poll ceiling
            claim_min_idle: Duration::from_secs(900),
            consume_block: Duration::from_secs(1),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_parse::<usize>("WORKER_MAX_JOBS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            shutdown_timeout: env_parse("WORKER_SHUTDOWN_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            claim_interval: env_parse("WORKER_CLAIM_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_interval),
            claim_min_idle: env_parse("WORKER_CLAIM_MIN_IDLE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_min_idle),
            consume_block: defaults.consume_block,
        }
    }
}

/// Submission, polling and commit policy for the job manager.
///
/// The poll timeout and the attempt budget are independent limits; whichever
/// is reached first ends the job as timed out.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Delay before the first poll
    pub base_delay: Duration,
    /// Multiplicative growth per poll
    pub backoff_factor: f64,
    /// Ceiling on a single delay
    pub max_delay: Duration,
    /// Maximum number of polls
    pub max_attempts: u32,
    /// Ceiling on time since submission
    pub timeout: Duration,
    /// Retries for transient submission and fetch errors
    pub max_submit_retries: u32,
    /// Retries for retryable index write errors
    pub max_commit_retries: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(15_000),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(60_000),
            max_attempts: 20,
            timeout: Duration::from_secs(600),
            max_submit_retries: 3,
            max_commit_retries: 3,
        }
    }
}

impl PollPolicy {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_delay: env_parse("POLL_BASE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            backoff_factor: env_parse::<f64>("POLL_BACKOFF_FACTOR")
                .filter(|f| *f >= 1.0 && f.is_finite())
                .unwrap_or(defaults.backoff_factor),
            max_delay: env_parse("POLL_MAX_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            max_attempts: env_parse::<u32>("POLL_MAX_ATTEMPTS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_attempts),
            timeout: env_parse("POLL_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_submit_retries: env_parse("SUBMIT_MAX_RETRIES")
                .unwrap_or(defaults.max_submit_retries),
            max_commit_retries: env_parse("COMMIT_MAX_RETRIES")
                .unwrap_or(defaults.max_commit_retries),
        }
    }
}

/// Frame sampling configuration.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Distance between sampled frames
    pub interval: Duration,
    /// Local directory holding media; when unset media is read through
    /// presigned blob store URLs
    pub media_root: Option<PathBuf>,
    /// Frame preprocessing
    pub preprocess: PreprocessConfig,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            media_root: None,
            preprocess: PreprocessConfig::default(),
        }
    }
}

impl SamplerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            interval: env_parse::<f64>("SAMPLE_INTERVAL_SECS")
                .filter(|s| s.is_finite() && *s >= MIN_SAMPLE_INTERVAL.as_secs_f64())
                .map(Duration::from_secs_f64)
                .unwrap_or(Duration::from_secs(1)),
            media_root: std::env::var("MEDIA_ROOT").ok().map(PathBuf::from),
            preprocess: PreprocessConfig::from_env(),
        }
    }
}
