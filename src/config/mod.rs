//! Layered configuration: built-in defaults, an optional TOML file at a
//! platform config directory, and environment-variable overrides with
//! `${VAR}` expansion — the `WikigraphConfig`/`ConfigFile` split the
//! teacher's own config loader uses, an all-`Option` file-shape struct
//! merged onto a fully-populated runtime struct.

use std::borrow::Cow;
use std::path::PathBuf;
use std::time::Duration;

use directories::BaseDirs;
use serde::Deserialize;

use crate::Result;

/// Expands `${VAR_NAME}` references in `input` against the process
/// environment. A reference to an unset variable is left verbatim.
///
/// Uses `Cow<str>` so the common case (no `${` at all) allocates nothing.
#[must_use]
pub fn expand_env_vars(input: &str) -> Cow<'_, str> {
    if !input.contains("${") {
        return Cow::Borrowed(input);
    }

    let mut result = input.to_string();
    let mut start = 0;
    while let Some(rel) = result[start..].find("${") {
        let var_start = start + rel;
        let Some(rel_end) = result[var_start..].find('}') else {
            break;
        };
        let var_end = var_start + rel_end;
        let var_name = &result[var_start + 2..var_end];
        if let Ok(value) = std::env::var(var_name) {
            let value_len = value.len();
            result.replace_range(var_start..=var_end, &value);
            start = var_start + value_len;
        } else {
            start = var_end + 1;
        }
    }
    Cow::Owned(result)
}

/// Fully-populated runtime configuration, after defaults + file + env have
/// been merged.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path to the `SQLite` database file.
    pub database_path: PathBuf,
    /// LLM subprocess settings.
    pub llm: LlmConfig,
    /// Cache capacities and TTLs (C3).
    pub cache: CacheConfig,
    /// Topic clustering constants (C10).
    pub clustering: ClusteringConfig,
    /// Duplicate detection constants (C8).
    pub duplicates: DuplicateConfig,
    /// Synthesis pipeline constants (C13).
    pub synthesis: SynthesisConfig,
    /// Semantic-similarity wikification constants.
    pub semantic: SemanticConfig,
    /// Directory synthesis export writes the static-site tree into (C14).
    pub export_dir: PathBuf,
}

/// LLM subprocess configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// CLI executable name or path, resolved against `PATH`.
    pub cli_path: String,
    /// Default model shorthand/id, used when no per-call or per-topic
    /// override applies.
    pub default_model: String,
    /// Per-call subprocess timeout.
    pub timeout: Duration,
    /// Maximum document content length fed into an entity-extraction prompt.
    pub max_entity_extraction_chars: usize,
}

/// Bounded-cache capacities and TTLs, one entry per named cache (C3).
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Document cache capacity.
    pub documents_capacity: usize,
    /// Document cache TTL.
    pub documents_ttl: Duration,
    /// Tag cache capacity.
    pub tags_capacity: usize,
    /// Tag cache TTL.
    pub tags_ttl: Duration,
    /// Search result cache capacity.
    pub search_capacity: usize,
    /// Search result cache TTL.
    pub search_ttl: Duration,
    /// Aggregation (analytics) cache capacity.
    pub aggregations_capacity: usize,
    /// Aggregation cache TTL.
    pub aggregations_ttl: Duration,
    /// Access-count write-coalescing batch threshold.
    pub access_buffer_batch: usize,
    /// Access-count write-coalescing time threshold.
    pub access_buffer_interval: Duration,
}

/// Topic-clustering constants (C10).
#[derive(Debug, Clone, Copy)]
pub struct ClusteringConfig {
    /// Minimum document frequency for an entity to survive pruning.
    pub min_df: u32,
    /// Maximum document-frequency ratio (of total docs) before pruning.
    pub max_df_ratio: f64,
    /// Floor on the absolute max-df cutoff, regardless of `max_df_ratio`.
    pub max_df_floor: u32,
    /// Edge weight below which a document pair is dropped from the graph.
    pub min_edge_weight: f64,
    /// CPM resolution parameter; lower values yield larger communities.
    pub resolution: f64,
    /// Clusters smaller than this are discarded.
    pub min_cluster_size: usize,
}

/// Duplicate-detection constants (C8).
#[derive(Debug, Clone, Copy)]
pub struct DuplicateConfig {
    /// MinHash permutation count.
    pub minhash_perms: usize,
    /// LSH similarity threshold.
    pub similarity_threshold: f64,
    /// Documents shorter than this (characters) are ignored entirely.
    pub min_content_len: usize,
}

/// Synthesis pipeline constants (C13).
#[derive(Debug, Clone, Copy)]
pub struct SynthesisConfig {
    /// Per-source character budget before the per-member relevance scale.
    pub max_doc_chars: usize,
    /// `stuff` vs `hierarchical` routing threshold, in total filtered chars.
    pub stuff_threshold_chars: usize,
    /// Hierarchical chunk size, in sources per chunk.
    pub hierarchical_chunk_size: usize,
    /// Minimum shared-entity count to create an entity-match link (C7).
    pub min_shared_entities: usize,
    /// Maximum new entity-match links created per document per run (C7).
    pub max_entity_links: usize,
}

/// Semantic-similarity wikification constants — the third layered
/// link-generation pass, over embedding cosine similarity rather than
/// literal title/entity matching.
#[derive(Debug, Clone, Copy)]
pub struct SemanticConfig {
    /// Minimum cosine similarity to create an `auto`-method link.
    pub similarity_threshold: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_data_dir().join("wikigraph.db"),
            llm: LlmConfig {
                cli_path: "claude".to_string(),
                default_model: "claude-sonnet-4".to_string(),
                timeout: Duration::from_secs(120),
                max_entity_extraction_chars: 8000,
            },
            cache: CacheConfig {
                documents_capacity: 500,
                documents_ttl: Duration::from_secs(300),
                tags_capacity: 200,
                tags_ttl: Duration::from_secs(600),
                search_capacity: 200,
                search_ttl: Duration::from_secs(60),
                aggregations_capacity: 50,
                aggregations_ttl: Duration::from_secs(300),
                access_buffer_batch: 50,
                access_buffer_interval: Duration::from_secs(30),
            },
            clustering: ClusteringConfig {
                min_df: 2,
                max_df_ratio: 0.15,
                max_df_floor: 5,
                min_edge_weight: 0.05,
                resolution: 0.05,
                min_cluster_size: 3,
            },
            duplicates: DuplicateConfig {
                minhash_perms: 256,
                similarity_threshold: 0.8,
                min_content_len: 50,
            },
            synthesis: SynthesisConfig {
                max_doc_chars: 12_000,
                stuff_threshold_chars: 80_000,
                hierarchical_chunk_size: 5,
                min_shared_entities: 2,
                max_entity_links: 15,
            },
            semantic: SemanticConfig {
                similarity_threshold: 0.82,
            },
            export_dir: PathBuf::from("wiki-export"),
        }
    }
}

/// The on-disk, all-`Option` shape of the optional TOML config file —
/// every field absent means "keep the default/runtime value".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// See [`AppConfig::database_path`].
    pub database_path: Option<String>,
    /// See [`LlmConfig::cli_path`].
    pub llm_cli_path: Option<String>,
    /// See [`LlmConfig::default_model`].
    pub llm_default_model: Option<String>,
    /// See [`LlmConfig::timeout`], in seconds.
    pub llm_timeout_secs: Option<u64>,
    /// See [`AppConfig::export_dir`].
    pub export_dir: Option<String>,
}

impl AppConfig {
    /// Platform config-file path: `<config dir>/wikigraph/config.toml`.
    #[must_use]
    pub fn config_file_path() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| dirs.config_dir().join("wikigraph").join("config.toml"))
    }

    /// Loads defaults, merges an optional TOML file at the platform config
    /// path (if present), then applies environment-variable overrides.
    /// `${VAR}` references inside string file values are expanded against
    /// the environment before the value is used.
    ///
    /// # Errors
    ///
    /// Returns an error if a present config file can't be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = Self::config_file_path()
            && path.exists()
        {
            let raw = std::fs::read_to_string(&path)?;
            let file: ConfigFile = toml::from_str(&raw)
                .map_err(|err| crate::Error::BadInput(format!("invalid config file: {err}")))?;
            config.merge_file(&file);
        }

        config.apply_env_overrides();
        Ok(config)
    }

    fn merge_file(&mut self, file: &ConfigFile) {
        if let Some(ref path) = file.database_path {
            self.database_path = PathBuf::from(expand_env_vars(path).into_owned());
        }
        if let Some(ref cli) = file.llm_cli_path {
            self.llm.cli_path = expand_env_vars(cli).into_owned();
        }
        if let Some(ref model) = file.llm_default_model {
            self.llm.default_model = expand_env_vars(model).into_owned();
        }
        if let Some(secs) = file.llm_timeout_secs {
            self.llm.timeout = Duration::from_secs(secs);
        }
        if let Some(ref dir) = file.export_dir {
            self.export_dir = PathBuf::from(expand_env_vars(dir).into_owned());
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("WIKIGRAPH_DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Ok(cli) = std::env::var("WIKIGRAPH_LLM_CLI") {
            self.llm.cli_path = cli;
        }
        if let Ok(model) = std::env::var("WIKIGRAPH_LLM_MODEL") {
            self.llm.default_model = model;
        }
        if let Ok(dir) = std::env::var("WIKIGRAPH_EXPORT_DIR") {
            self.export_dir = PathBuf::from(dir);
        }
    }
}

fn default_data_dir() -> PathBuf {
    BaseDirs::new().map_or_else(
        || PathBuf::from("."),
        |dirs| dirs.data_local_dir().join("wikigraph"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_env_vars_substitutes_known_variable() {
        // SAFETY: test-local env var, no concurrent access in this process.
        unsafe { std::env::set_var("WIKIGRAPH_TEST_VAR", "value") };
        assert_eq!(expand_env_vars("prefix-${WIKIGRAPH_TEST_VAR}-suffix"), "prefix-value-suffix");
        unsafe { std::env::remove_var("WIKIGRAPH_TEST_VAR") };
    }

    #[test]
    fn expand_env_vars_leaves_unknown_variable_verbatim() {
        assert_eq!(expand_env_vars("${WIKIGRAPH_DEFINITELY_UNSET}"), "${WIKIGRAPH_DEFINITELY_UNSET}");
    }

    #[test]
    fn expand_env_vars_no_allocation_fast_path() {
        assert_eq!(expand_env_vars("no vars here"), Cow::Borrowed("no vars here"));
    }

    #[test]
    fn default_config_has_sane_clustering_constants() {
        let config = AppConfig::default();
        assert_eq!(config.clustering.min_cluster_size, 3);
        assert!(config.clustering.min_edge_weight > 0.0);
    }
}
