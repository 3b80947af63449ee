//! File-based config loader (`routewarden.json`) with environment-variable
//! fallback, one `resolve_*` method per config key. Precedence chain:
//! JSON field → env var → hardcoded default.

use std::path::PathBuf;

pub const MIN_DEPTH: usize = 1;
pub const MAX_DEPTH: usize = 5;
pub const MIN_WORKERS: usize = 2;
pub const MAX_WORKERS: usize = 10;
pub const MIN_PARALLEL_KBS: usize = 1;
pub const MAX_PARALLEL_KBS: usize = 5;

#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct EngineConfigFile {
    pub request_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub connection_pool_size: Option<usize>,
    pub default_delay_secs: Option<f64>,
    pub max_delay_secs: Option<f64>,
    pub max_content_length: Option<usize>,
    pub max_headings: Option<usize>,
}

/// Resolved engine configuration, env-overridable.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub connection_pool_size: usize,
    pub default_delay_secs: f64,
    pub max_delay_secs: f64,
    pub max_content_length: usize,
    pub max_headings: usize,
}

impl EngineConfigFile {
    pub fn resolve_request_timeout_secs(&self) -> u64 {
        if let Some(v) = self.request_timeout_secs {
            return v;
        }
        std::env::var("REQUEST_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30)
    }

    pub fn resolve_max_retries(&self) -> u32 {
        if let Some(v) = self.max_retries {
            return v;
        }
        std::env::var("MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3)
    }

    pub fn resolve_connection_pool_size(&self) -> usize {
        if let Some(v) = self.connection_pool_size {
            return v;
        }
        std::env::var("CONNECTION_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100)
    }

    pub fn resolve_default_delay_secs(&self) -> f64 {
        if let Some(v) = self.default_delay_secs {
            return v;
        }
        std::env::var("DEFAULT_DELAY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.25)
    }

    pub fn resolve_max_delay_secs(&self) -> f64 {
        if let Some(v) = self.max_delay_secs {
            return v;
        }
        std::env::var("MAX_DELAY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5.0)
    }

    pub fn resolve_max_content_length(&self) -> usize {
        if let Some(v) = self.max_content_length {
            return v;
        }
        std::env::var("MAX_CONTENT_LENGTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(50_000)
    }

    pub fn resolve_max_headings(&self) -> usize {
        if let Some(v) = self.max_headings {
            return v;
        }
        std::env::var("MAX_HEADINGS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(50)
    }

    pub fn into_resolved(self) -> EngineConfig {
        EngineConfig {
            request_timeout_secs: self.resolve_request_timeout_secs(),
            max_retries: self.resolve_max_retries(),
            connection_pool_size: self.resolve_connection_pool_size(),
            default_delay_secs: self.resolve_default_delay_secs(),
            max_delay_secs: self.resolve_max_delay_secs(),
            max_content_length: self.resolve_max_content_length(),
            max_headings: self.resolve_max_headings(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfigFile::default().into_resolved()
    }
}

/// Load `routewarden.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `ROUTEWARDEN_CONFIG` env var path
/// 2. `./routewarden.json` (process cwd)
///
/// Missing file → all-default `EngineConfig` (env-var fallbacks still
/// apply per field). Parse error → log a warning, fall back to defaults.
pub fn load_engine_config() -> EngineConfig {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(env_path) = std::env::var("ROUTEWARDEN_CONFIG") {
        candidates.push(PathBuf::from(env_path));
    }
    candidates.push(PathBuf::from("routewarden.json"));

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<EngineConfigFile>(&contents) {
                Ok(cfg) => {
                    tracing::info!(path = %path.display(), "loaded routewarden.json");
                    return cfg.into_resolved();
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to parse config file, using defaults");
                    return EngineConfigFile::default().into_resolved();
                }
            },
            Err(_) => continue,
        }
    }

    EngineConfigFile::default().into_resolved()
}

/// Clamp a `worker_count` request into `[MIN_WORKERS, MAX_WORKERS]`.
pub fn clamp_worker_count(requested: usize) -> usize {
    requested.clamp(MIN_WORKERS, MAX_WORKERS)
}

/// Clamp a `max_depth` request into `[MIN_DEPTH, MAX_DEPTH]`.
pub fn clamp_max_depth(requested: usize) -> usize {
    requested.clamp(MIN_DEPTH, MAX_DEPTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_expected_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.request_timeout_secs, 30);
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.connection_pool_size, 100);
        assert_eq!(cfg.default_delay_secs, 0.25);
        assert_eq!(cfg.max_delay_secs, 5.0);
        assert_eq!(cfg.max_content_length, 50_000);
        assert_eq!(cfg.max_headings, 50);
    }

    #[test]
    fn clamps_apply() {
        assert_eq!(clamp_worker_count(1), MIN_WORKERS);
        assert_eq!(clamp_worker_count(100), MAX_WORKERS);
        assert_eq!(clamp_worker_count(5), 5);
        assert_eq!(clamp_max_depth(0), MIN_DEPTH);
        assert_eq!(clamp_max_depth(99), MAX_DEPTH);
    }
}
