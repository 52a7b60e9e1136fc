use std::env;
use std::path::PathBuf;

/// Runtime configuration for the import pipeline
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Number of concurrent import workers (default: 4)
    pub worker_count: usize,

    /// Maximum accepted archive size in bytes (default: 256 MB)
    pub max_archive_size: usize,

    /// Directory under which staging areas are created
    pub staging_root: PathBuf,

    /// Hours a terminal upload record is retained before purging (default: 24)
    pub retention_hours: u64,

    /// Seconds between retention sweeps (default: 3600)
    pub sweep_interval_secs: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_archive_size: 256 * 1024 * 1024, // 256 MB
            staging_root: env::temp_dir().join("geo-import-staging"),
            retention_hours: 24,
            sweep_interval_secs: 3600,
        }
    }
}

impl ImportConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            worker_count: env::var("IMPORT_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(default.worker_count),

            max_archive_size: env::var("MAX_ARCHIVE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_archive_size),

            staging_root: env::var("STAGING_ROOT")
                .ok()
                .map(PathBuf::from)
                .unwrap_or(default.staging_root),

            retention_hours: env::var("RETENTION_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.retention_hours),

            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.sweep_interval_secs),
        }
    }

    /// Create config for development and tests (small pool, fast sweeps)
    pub fn development() -> Self {
        Self {
            worker_count: 2,
            max_archive_size: 64 * 1024 * 1024,
            staging_root: env::temp_dir().join("geo-import-staging-dev"),
            retention_hours: 1,
            sweep_interval_secs: 60,
        }
    }
}
