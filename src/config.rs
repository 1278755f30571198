use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    pub graph: GraphConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_chunk_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of results a query ultimately keeps.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Hard cap on over-retrieved candidates handed to the reranker.
    #[serde(default = "default_over_retrieve_cap")]
    pub over_retrieve_cap: usize,
    /// Per-result truncation applied before dedup and formatting.
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            over_retrieve_cap: default_over_retrieve_cap(),
            max_chunk_chars: default_max_chunk_chars(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_over_retrieve_cap() -> usize {
    20
}
fn default_max_chunk_chars() -> usize {
    1200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"hash"` (deterministic local), `"openai"`, or `"disabled"`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_dims() -> usize {
    256
}
fn default_batch_size() -> usize {
    166
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions base URL. Groq and OpenAI both work.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// Maximum think-act-observe cycles before forced termination.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Every observation is truncated to this length before appending.
    #[serde(default = "default_observation_max_chars")]
    pub observation_max_chars: usize,
    /// Once the transcript exceeds this many turns, compact it.
    #[serde(default = "default_compact_after_turns")]
    pub compact_after_turns: usize,
    /// Turns retained after compaction (in addition to the system turn).
    #[serde(default = "default_keep_recent_turns")]
    pub keep_recent_turns: usize,
    /// Answer cache capacity (entries); least-recently-used eviction.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            observation_max_chars: default_observation_max_chars(),
            compact_after_turns: default_compact_after_turns(),
            keep_recent_turns: default_keep_recent_turns(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_max_steps() -> usize {
    8
}
fn default_observation_max_chars() -> usize {
    4000
}
fn default_compact_after_turns() -> usize {
    12
}
fn default_keep_recent_turns() -> usize {
    8
}
fn default_cache_capacity() -> usize {
    128
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    /// Location of the serialized dependency graph.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7432".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Glob patterns excluded from the repository walk, in addition to defaults.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "hash" | "openai" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, or disabled.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        anyhow::bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }
    if config.embedding.provider == "openai" && config.embedding.model.is_none() {
        anyhow::bail!("embedding.model must be specified when provider is 'openai'");
    }

    if config.agent.max_steps == 0 {
        anyhow::bail!("agent.max_steps must be >= 1");
    }
    if config.agent.observation_max_chars < 64 {
        anyhow::bail!("agent.observation_max_chars must be >= 64");
    }
    if config.agent.keep_recent_turns == 0 {
        anyhow::bail!("agent.keep_recent_turns must be >= 1");
    }

    Ok(config)
}
