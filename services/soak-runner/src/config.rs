//! Configuration loading and management.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use store_client::LockTimings;

/// Value written to every key when the scenario does not supply one: a small
/// fixed JSON document.
pub const DEFAULT_PAYLOAD: &str = r#"[{"index":0,"guid":"3d7e1f2a-9c41-4b8e-b5a6-0f28d1c77e19","isActive":true,"name":"Marisol Whitfield","company":"KINETICA","phone":"+1 (884) 521-3167","address":"742 Harbor Lane, Eastport","registered":"2019-04-17T08:21:55","latitude":46.7111,"longitude":-121.2513},{"index":1,"guid":"8a52c0de-66b7-4f03-9d8f-44e09a31bb02","isActive":false,"name":"Dorian Calderon","company":"ZENTRIX","phone":"+1 (953) 402-2794","address":"118 Beacon Court, Larkspur","registered":"2021-11-03T14:02:39","latitude":-33.8523,"longitude":151.2108},{"index":2,"guid":"f19b6e84-2d5c-4a77-8e31-cc0571fa9d46","isActive":true,"name":"Petra Lindqvist","company":"OBLIQUA","phone":"+1 (617) 880-4415","address":"305 Quarry Street, Millbrook","registered":"2017-06-28T19:45:12","latitude":59.3293,"longitude":18.0686}]"#;

/// Main harness configuration, loadable from a YAML scenario file.
///
/// Every field has a default, so an empty scenario (or none at all) runs the
/// standard soak: 100k keys, three thread groups, flat set membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoakConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Store endpoint, e.g. `redis://127.0.0.1:6379`.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Size of the generated key space.
    #[serde(default = "default_key_count")]
    pub key_count: usize,
    /// Replication multiplier: every workload loop is launched once per group.
    #[serde(default = "default_thread_groups")]
    pub thread_groups: usize,
    /// Bucketed (true) vs flat (false) set-membership strategy.
    #[serde(default)]
    pub use_buckets: bool,
    /// In-flight cap for the warm-up write pass.
    #[serde(default = "default_warmup_fanout")]
    pub warmup_fanout: usize,
    /// In-flight cap for the per-bucket fan-out in bucketed mode.
    #[serde(default = "default_bucket_fanout")]
    pub bucket_fanout: usize,
    /// Lock-contention timing knobs.
    #[serde(default)]
    pub lock: LockConfig,
    /// Value written by every set; `None` selects the built-in payload.
    #[serde(default)]
    pub payload: Option<String>,
    /// Seconds between aggregate latency summaries in the log.
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
}

/// Distributed-lock timing configuration, all in milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LockConfig {
    /// Server-side lease before the lock expires on its own.
    #[serde(default = "default_lock_lease_ms")]
    pub lease_ms: u64,
    /// Total acquisition budget per attempt.
    #[serde(default = "default_lock_max_wait_ms")]
    pub max_wait_ms: u64,
    /// Pause between acquisition attempts.
    #[serde(default = "default_lock_retry_ms")]
    pub retry_ms: u64,
    /// Duration of the simulated critical-section work.
    #[serde(default = "default_lock_hold_ms")]
    pub hold_ms: u64,
}

fn default_name() -> String {
    "redis soak".to_string()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_key_count() -> usize {
    100_000
}

fn default_thread_groups() -> usize {
    3
}

fn default_warmup_fanout() -> usize {
    50
}

fn default_bucket_fanout() -> usize {
    10
}

fn default_report_interval_secs() -> u64 {
    30
}

fn default_lock_lease_ms() -> u64 {
    500
}

fn default_lock_max_wait_ms() -> u64 {
    500
}

fn default_lock_retry_ms() -> u64 {
    100
}

fn default_lock_hold_ms() -> u64 {
    500
}

impl Default for SoakConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            description: String::new(),
            redis_url: default_redis_url(),
            key_count: default_key_count(),
            thread_groups: default_thread_groups(),
            use_buckets: false,
            warmup_fanout: default_warmup_fanout(),
            bucket_fanout: default_bucket_fanout(),
            lock: LockConfig::default(),
            payload: None,
            report_interval_secs: default_report_interval_secs(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_ms: default_lock_lease_ms(),
            max_wait_ms: default_lock_max_wait_ms(),
            retry_ms: default_lock_retry_ms(),
            hold_ms: default_lock_hold_ms(),
        }
    }
}

impl LockConfig {
    pub fn timings(&self) -> LockTimings {
        LockTimings {
            lease: Duration::from_millis(self.lease_ms),
            max_wait: Duration::from_millis(self.max_wait_ms),
            retry: Duration::from_millis(self.retry_ms),
        }
    }

    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }
}

impl SoakConfig {
    /// Load configuration from a YAML scenario file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SoakConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.key_count == 0 {
            anyhow::bail!("key_count must be > 0");
        }
        if self.thread_groups == 0 {
            anyhow::bail!("thread_groups must be > 0");
        }
        if self.warmup_fanout == 0 {
            anyhow::bail!("warmup_fanout must be > 0");
        }
        if self.bucket_fanout == 0 {
            anyhow::bail!("bucket_fanout must be > 0");
        }
        if self.lock.lease_ms == 0 {
            anyhow::bail!("lock.lease_ms must be > 0");
        }
        if self.lock.retry_ms == 0 {
            anyhow::bail!("lock.retry_ms must be > 0");
        }
        if self.report_interval_secs == 0 {
            anyhow::bail!("report_interval_secs must be > 0");
        }
        Ok(())
    }

    /// The value every set operation writes.
    pub fn payload(&self) -> Arc<str> {
        match &self.payload {
            Some(custom) => Arc::from(custom.as_str()),
            None => Arc::from(DEFAULT_PAYLOAD),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_standard_soak() {
        let config = SoakConfig::default();
        assert_eq!(config.key_count, 100_000);
        assert_eq!(config.thread_groups, 3);
        assert!(!config.use_buckets);
        assert_eq!(config.warmup_fanout, 50);
        assert_eq!(config.bucket_fanout, 10);
        assert_eq!(config.lock.lease_ms, 500);
        assert_eq!(config.lock.max_wait_ms, 500);
        assert_eq!(config.lock.hold_ms, 500);
        config.validate().unwrap();
    }

    #[test]
    fn parses_scenario_yaml_with_partial_overrides() {
        let yaml = r#"
name: bucketed soak
redis_url: redis://redis:6379
key_count: 5000
use_buckets: true
lock:
  retry_ms: 50
"#;
        let config: SoakConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.name, "bucketed soak");
        assert_eq!(config.redis_url, "redis://redis:6379");
        assert_eq!(config.key_count, 5000);
        assert!(config.use_buckets);
        assert_eq!(config.lock.retry_ms, 50);
        // Unspecified fields keep their defaults.
        assert_eq!(config.thread_groups, 3);
        assert_eq!(config.lock.lease_ms, 500);
    }

    #[test]
    fn empty_scenario_parses_to_defaults() {
        let config: SoakConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.key_count, 100_000);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_zero_key_count() {
        let config = SoakConfig {
            key_count: 0,
            ..SoakConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_thread_groups() {
        let config = SoakConfig {
            thread_groups: 0,
            ..SoakConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn custom_payload_overrides_builtin() {
        let config = SoakConfig {
            payload: Some("tiny".to_string()),
            ..SoakConfig::default()
        };
        assert_eq!(&*config.payload(), "tiny");
        assert!(SoakConfig::default().payload().starts_with("[{"));
    }
}
