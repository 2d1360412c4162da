//! Server configuration, read from TOML.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use same_graph_core::Representation;
use same_motion_core::NormalizeOptions;
use serde::{Deserialize, Serialize};

/// How output files are named. Names are unique per request within a process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputNaming {
    /// `result_<n>.bvh`
    #[default]
    Counter,
    /// `<source>_<target>_<n>.bvh`
    SourceTarget,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_checkpoint")]
    pub checkpoint: String,
    #[serde(default = "default_device")]
    pub device: String,
}

fn default_checkpoint() -> String {
    "name-match".to_string()
}
fn default_device() -> String {
    "cpu".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            checkpoint: default_checkpoint(),
            device: default_device(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Upper bound on one blocking accept; the shutdown flag is checked between accepts.
    #[serde(default = "default_accept_timeout_ms")]
    pub accept_timeout_ms: u64,
    /// Size of the single receive buffer a request must fit in.
    #[serde(default = "default_recv_buffer_bytes")]
    pub recv_buffer_bytes: usize,
    #[serde(default = "default_max_frames")]
    pub max_frames: usize,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub output_naming: OutputNaming,
    #[serde(default)]
    pub model: ModelConfig,
    /// JSON statistics file; identity statistics when unset.
    #[serde(default)]
    pub statistics_path: Option<PathBuf>,
    #[serde(default)]
    pub representation: Representation,
    #[serde(default)]
    pub normalize: NormalizeOptions,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_listen_addr() -> String {
    "127.0.0.1:9999".to_string()
}
fn default_accept_timeout_ms() -> u64 {
    1000
}
fn default_recv_buffer_bytes() -> usize {
    1024
}
fn default_max_frames() -> usize {
    50
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            accept_timeout_ms: default_accept_timeout_ms(),
            recv_buffer_bytes: default_recv_buffer_bytes(),
            max_frames: default_max_frames(),
            output_dir: default_output_dir(),
            output_naming: OutputNaming::default(),
            model: ModelConfig::default(),
            statistics_path: None,
            representation: Representation::default(),
            normalize: NormalizeOptions::default(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("failed to parse server config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_frames == 0 {
            bail!("max_frames must be at least 1");
        }
        if self.recv_buffer_bytes == 0 {
            bail!("recv_buffer_bytes must be at least 1");
        }
        if !(self.normalize.unit_scale.is_finite() && self.normalize.unit_scale > 0.0) {
            bail!("normalize.unit_scale must be positive, got {}", self.normalize.unit_scale);
        }
        self.log_level()?;
        Ok(())
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    pub fn log_level(&self) -> Result<log::Level> {
        self.log_level
            .parse()
            .map_err(|_| anyhow!("invalid log level '{}'", self.log_level))
    }
}
