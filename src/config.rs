//! Configuration from environment variables and an optional JSON file.
//!
//! `PDWFS_CONF` points at a JSON file parsed first; `PDWFS_REDIS`,
//! `PDWFS_MOUNTPATH` and `PDWFS_STRIPESIZE` override it. `PDWFS_LOGS`
//! gates the tracing subscriber and `PDWFS_DUMPCONF` dumps the
//! effective configuration to `pdwfs.json` at startup.

use crate::common::{path, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;

/// Default maximum size of a file stripe (10 MiB).
pub const DEFAULT_STRIPE_SIZE: u64 = 10 * 1024 * 1024;

/// Largest value a Redis shard can hold in a single string (512 MiB).
pub const MAX_STRIPE_SIZE: u64 = 512 * 1024 * 1024;

const DEFAULT_MAX_CONNECTIONS: usize = 50;

fn default_stripe_size() -> u64 {
    DEFAULT_STRIPE_SIZE
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

/// One mount root served by the filesystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    pub path: String,
    #[serde(default = "default_stripe_size")]
    pub stripe_size: u64,
}

/// Shard endpoints and per-shard connection pool bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardsConfig {
    pub addrs: Vec<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ShardsConfig {
    fn default() -> Self {
        Self {
            addrs: vec![":6379".to_string()],
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mounts: HashMap<String, MountConfig>,
    #[serde(default)]
    pub shards: ShardsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mounts: HashMap::new(),
            shards: ShardsConfig::default(),
        }
    }
}

impl Config {
    /// Build the effective configuration from the environment.
    pub fn load() -> Result<Self> {
        let mut conf = match env::var("PDWFS_CONF") {
            Ok(file) if !file.is_empty() => Self::from_file(&file)?,
            _ => Self::default(),
        };

        if let Ok(addrs) = env::var("PDWFS_REDIS") {
            let addrs: Vec<String> = addrs
                .split(',')
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect();
            if !addrs.is_empty() {
                conf.shards.addrs = addrs;
            }
        }

        if let Ok(mount_path) = env::var("PDWFS_MOUNTPATH") {
            if !mount_path.is_empty() {
                conf.mounts.insert(
                    mount_path.clone(),
                    MountConfig {
                        path: mount_path,
                        stripe_size: DEFAULT_STRIPE_SIZE,
                    },
                );
            }
        }

        if let Ok(stripe_mib) = env::var("PDWFS_STRIPESIZE") {
            if !stripe_mib.is_empty() {
                let mib: u64 = stripe_mib.parse().map_err(|_| {
                    Error::Config(format!("invalid PDWFS_STRIPESIZE value: {stripe_mib}"))
                })?;
                for mount in conf.mounts.values_mut() {
                    mount.stripe_size = mib * 1024 * 1024;
                }
            }
        }

        conf.normalize()?;

        if env::var("PDWFS_DUMPCONF").map(|v| !v.is_empty()).unwrap_or(false) {
            conf.dump("pdwfs.json")?;
        }

        Ok(conf)
    }

    pub fn from_file(file: &str) -> Result<Self> {
        let content = fs::read_to_string(file)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {file}: {e}")))
    }

    pub fn add_mount(&mut self, mount_path: &str, stripe_size: u64) {
        self.mounts.insert(
            mount_path.to_string(),
            MountConfig {
                path: mount_path.to_string(),
                stripe_size,
            },
        );
    }

    /// Absolutise mount roots and verify stripe sizes against the shard
    /// string cap.
    pub fn normalize(&mut self) -> Result<()> {
        let mut normalized = HashMap::new();
        for mount in self.mounts.values() {
            let abs = path::absolutize(&mount.path)?;
            if mount.stripe_size == 0 || mount.stripe_size > MAX_STRIPE_SIZE {
                return Err(Error::Config(format!(
                    "mount {}: stripe size must be between 1 byte and 512 MiB, got {}",
                    abs, mount.stripe_size
                )));
            }
            if let Ok(entries) = fs::read_dir(&abs) {
                if entries.count() != 0 {
                    tracing::warn!(
                        mount = %abs,
                        "mount path is not empty, existing files will not be readable through the mount"
                    );
                }
            }
            normalized.insert(
                abs.clone(),
                MountConfig {
                    path: abs,
                    stripe_size: mount.stripe_size,
                },
            );
        }
        self.mounts = normalized;
        Ok(())
    }

    /// Write the effective configuration as JSON.
    pub fn dump(&self, file: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {e}")))?;
        fs::write(file, content)?;
        Ok(())
    }
}

/// Install a stderr tracing subscriber when `PDWFS_LOGS` is set; events
/// are discarded otherwise.
pub fn init_logging() {
    if env::var("PDWFS_LOGS").map(|v| !v.is_empty()).unwrap_or(false) {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("stripefs=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .compact()
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let conf = Config::default();
        assert_eq!(conf.shards.addrs, vec![":6379".to_string()]);
        assert_eq!(conf.shards.max_connections, 50);
        assert!(conf.mounts.is_empty());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "mounts": {{
                    "/scratch": {{ "path": "/scratch", "stripe_size": 1048576 }},
                    "/data": {{ "path": "/data" }}
                }},
                "shards": {{ "addrs": ["host1:6379", "host2:6379"] }}
            }}"#
        )
        .unwrap();

        let conf = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(conf.mounts["/scratch"].stripe_size, 1024 * 1024);
        assert_eq!(conf.mounts["/data"].stripe_size, DEFAULT_STRIPE_SIZE);
        assert_eq!(conf.shards.addrs.len(), 2);
        assert_eq!(conf.shards.max_connections, 50);
    }

    #[test]
    fn test_normalize_rejects_oversized_stripes() {
        let mut conf = Config::default();
        conf.add_mount("/scratch", MAX_STRIPE_SIZE + 1);
        assert!(matches!(conf.normalize(), Err(Error::Config(_))));

        let mut conf = Config::default();
        conf.add_mount("/scratch", 0);
        assert!(matches!(conf.normalize(), Err(Error::Config(_))));
    }

    #[test]
    fn test_normalize_absolutizes_mounts() {
        let mut conf = Config::default();
        conf.add_mount("/scratch//jobs/../out", DEFAULT_STRIPE_SIZE);
        conf.normalize().unwrap();
        assert!(conf.mounts.contains_key("/scratch/out"));
        assert_eq!(conf.mounts["/scratch/out"].path, "/scratch/out");
    }

    #[test]
    fn test_dump() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("pdwfs.json");
        let mut conf = Config::default();
        conf.add_mount("/scratch", DEFAULT_STRIPE_SIZE);
        conf.dump(out.to_str().unwrap()).unwrap();

        let reloaded = Config::from_file(out.to_str().unwrap()).unwrap();
        assert_eq!(reloaded.mounts["/scratch"].stripe_size, DEFAULT_STRIPE_SIZE);
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("PDWFS_REDIS", "nodeA:7000,nodeB:7000");
        env::set_var("PDWFS_MOUNTPATH", "/scratch/job42");
        env::set_var("PDWFS_STRIPESIZE", "2");

        let conf = Config::load().unwrap();
        assert_eq!(
            conf.shards.addrs,
            vec!["nodeA:7000".to_string(), "nodeB:7000".to_string()]
        );
        assert_eq!(conf.mounts["/scratch/job42"].stripe_size, 2 * 1024 * 1024);

        env::remove_var("PDWFS_REDIS");
        env::remove_var("PDWFS_MOUNTPATH");
        env::remove_var("PDWFS_STRIPESIZE");
    }
}
