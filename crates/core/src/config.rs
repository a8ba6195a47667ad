//! Runtime configuration read from `K9RS_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_DISCOVERY_TTL_SECS: u64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Where cached discovery documents are kept (`K9RS_DISCOVERY_CACHE_DIR`).
    pub discovery_cache_dir: PathBuf,
    /// How long a cached discovery document stays fresh (`K9RS_DISCOVERY_TTL_SECS`).
    pub discovery_cache_ttl: Duration,
    /// Screen dump location (`K9RS_SCREEN_DUMP_DIR`).
    pub screen_dump_dir: PathBuf,
    /// Benchmark results location (`K9RS_BENCHMARK_DIR`).
    pub benchmark_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let base = base_dir();
        Self {
            discovery_cache_dir: base.join("cache").join("discovery"),
            discovery_cache_ttl: Duration::from_secs(DEFAULT_DISCOVERY_TTL_SECS),
            screen_dump_dir: base.join("screen-dumps"),
            benchmark_dir: base.join("benchmarks"),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(p) = env_path("K9RS_DISCOVERY_CACHE_DIR") {
            cfg.discovery_cache_dir = p;
        }
        if let Some(secs) = std::env::var("K9RS_DISCOVERY_TTL_SECS").ok().and_then(|s| s.parse().ok()) {
            cfg.discovery_cache_ttl = Duration::from_secs(secs);
        }
        if let Some(p) = env_path("K9RS_SCREEN_DUMP_DIR") {
            cfg.screen_dump_dir = p;
        }
        if let Some(p) = env_path("K9RS_BENCHMARK_DIR") {
            cfg.benchmark_dir = p;
        }
        cfg
    }
}

/// `~/.k9rs`, or a directory under the system temp dir when there is no home.
pub fn base_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(std::env::temp_dir).join(".k9rs")
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty()).map(PathBuf::from)
}
