//! Runtime configuration for inference-gateway.
//!
//! Configuration is loaded from a JSON file and then overridden by CLI flags
//! or their environment variables (`HOST`, `PORT`, `MODEL_NAME`, ...).
//! Engine sizing knobs, sampling defaults and server limits all live here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "inference-gateway",
    about = "OpenAI-compatible gateway in front of a shared LLM engine"
)]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "gateway.json")]
    pub config: PathBuf,

    /// Listen host.
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Listen port.
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Model identifier served by the engine.
    #[arg(long, env = "MODEL_NAME")]
    pub model: Option<String>,

    /// Fraction of GPU memory the engine may claim.
    #[arg(long, env = "GPU_MEMORY_UTILIZATION")]
    pub gpu_memory_utilization: Option<f32>,

    /// Maximum number of sequences the engine runs concurrently.
    #[arg(long, env = "MAX_NUM_SEQS")]
    pub max_num_seqs: Option<usize>,

    /// Tensor-parallel degree.
    #[arg(long, env = "TENSOR_PARALLEL_SIZE")]
    pub tensor_parallel_size: Option<usize>,

    /// Pipeline-parallel degree.
    #[arg(long, env = "PIPELINE_PARALLEL_SIZE")]
    pub pipeline_parallel_size: Option<usize>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Engine configuration.
    pub engine: EngineConfig,

    /// Sampling defaults applied when a request omits a field.
    pub sampling: SamplingDefaults,

    /// Response shaping.
    pub response: ResponseConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen host (e.g. "0.0.0.0").
    pub host: String,

    /// Listen port.
    pub port: u16,

    /// Deadline for a single engine submission. `None` disables it.
    pub request_timeout_secs: Option<u64>,

    /// Upper bound on how long shutdown waits for in-flight generations.
    pub drain_timeout_secs: u64,

    /// Allow any origin (the desktop shell calls from a browser context).
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            request_timeout_secs: Some(300),
            drain_timeout_secs: 30,
            cors_permissive: true,
        }
    }
}

/// Engine construction and sizing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model identifier (e.g. "deepseek-ai/DeepSeek-R1-Distill-Qwen-7B").
    pub model: String,

    /// Fraction of GPU memory the engine may claim, in (0, 1].
    pub gpu_memory_utilization: f32,

    /// Maximum concurrent sequences inside the engine.
    pub max_num_seqs: usize,

    /// Tensor-parallel degree.
    pub tensor_parallel_size: usize,

    /// Pipeline-parallel degree.
    pub pipeline_parallel_size: usize,

    /// Prefix for request handle identifiers.
    pub request_id_prefix: String,

    /// Artificial cold-load delay for the built-in backend, in milliseconds.
    pub load_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: "deepseek-ai/DeepSeek-R1-Distill-Qwen-7B".to_string(),
            gpu_memory_utilization: 0.9,
            max_num_seqs: 256,
            tensor_parallel_size: 1,
            pipeline_parallel_size: 1,
            request_id_prefix: "gateway".to_string(),
            load_delay_ms: 0,
        }
    }
}

impl EngineConfig {
    /// Owner reported in model listings: the organisation part of the model id.
    pub fn owned_by(&self) -> &str {
        match self.model.split_once('/') {
            Some((org, _)) if !org.is_empty() => org,
            _ => "local",
        }
    }
}

/// Sampling values used when a request leaves a field out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingDefaults {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: i64,
}

impl Default for SamplingDefaults {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 512,
        }
    }
}

/// Response shaping options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Report the engine's own finish reason (`length` vs `stop`) instead of
    /// always answering `stop`.
    pub report_engine_finish_reason: bool,
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Apply CLI/env overrides on top of file values.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(model) = &cli.model {
            self.engine.model = model.clone();
        }
        if let Some(util) = cli.gpu_memory_utilization {
            self.engine.gpu_memory_utilization = util;
        }
        if let Some(n) = cli.max_num_seqs {
            self.engine.max_num_seqs = n;
        }
        if let Some(n) = cli.tensor_parallel_size {
            self.engine.tensor_parallel_size = n;
        }
        if let Some(n) = cli.pipeline_parallel_size {
            self.engine.pipeline_parallel_size = n;
        }
    }

    /// Address the HTTP listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.server.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.server.drain_timeout_secs)
    }
}
