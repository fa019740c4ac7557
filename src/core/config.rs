use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::resilience::retry::RetryPolicy;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub ingest: IngestConfig,
    pub store: StoreConfig,
    pub export: ExportConfig,
    pub graph: GraphConfig,
    pub network: NetworkConfig,
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Column delimiter of the input files
    pub delimiter: char,
    /// Rows missing any of these columns are skipped
    pub required_fields: Vec<String>,
    /// Rows per batch; cancellation is checked between batches
    pub batch_size: usize,
    /// Default for absent text fields
    pub unknown_sentinel: String,
    /// Normalization threads (0 = all available)
    pub threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `sqlite://<path>`, `sqlite::memory:` or a bare file path
    pub connection: Option<String>,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub base_uri: String,
    pub max_triples_per_chunk: usize,
    /// Rows fetched per query while walking the store
    pub page_size: usize,
    /// Restrict taxa (and their distributions) to accepted names
    pub accepted_only: bool,
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Neo4j Bolt URI, e.g. bolt://localhost:7687 or neo4j://host:7687
    pub endpoint: Option<String>,
    pub database: String,
    pub user: Option<String>,
    /// Prefer NEO4J_PASSWORD over storing this in the file
    pub password: Option<String>,
    /// Embedded graph store used when no endpoint is configured
    pub embedded_path: Option<String>,
    /// Rows sent per Cypher statement
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub url: String,
    pub names_file: String,
    pub distribution_file: String,
    pub data_dir: Option<String>,
    /// NCBI Taxonomy dump carrying names.dmp
    pub taxonomy_url: String,
    /// Directory URL holding the WGSRPD tblLevel1-3 tables
    pub wgsrpd_url: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            delimiter: '|',
            required_fields: vec![
                "plant_name_id".to_string(),
                "family".to_string(),
                "genus".to_string(),
                "species".to_string(),
            ],
            batch_size: 1000,
            unknown_sentinel: "Unknown".to_string(),
            threads: 0,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection: None, // Will default to ~/.florakb/florakb.db
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            base_uri: "https://biokb.scai.fraunhofer.de/wcvp".to_string(),
            max_triples_per_chunk: 100_000,
            page_size: 5000,
            accepted_only: false,
            output: None,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            database: "neo4j".to_string(),
            user: Some("neo4j".to_string()),
            password: None,
            embedded_path: None,
            batch_size: 1000,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_attempts: 4,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            url: "https://sftp.kew.org/pub/data-repositories/WCVP/wcvp.zip".to_string(),
            names_file: "wcvp_names.csv".to_string(),
            distribution_file: "wcvp_distribution.csv".to_string(),
            data_dir: None,
            taxonomy_url: "https://ftp.ncbi.nlm.nih.gov/pub/taxonomy/taxdmp.zip".to_string(),
            wgsrpd_url:
                "https://raw.githubusercontent.com/tdwg/wgsrpd/master/109-488-1-ED/2nd%20Edition/"
                    .to_string(),
        }
    }
}

impl IngestConfig {
    pub fn delimiter_byte(&self) -> Result<u8, crate::FloraError> {
        u8::try_from(self.delimiter).map_err(|_| {
            crate::FloraError::Config(format!(
                "Delimiter must be a single-byte character, got {:?}",
                self.delimiter
            ))
        })
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            ..RetryPolicy::for_network()
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), crate::FloraError> {
        self.ingest.delimiter_byte()?;
        if self.ingest.batch_size == 0 {
            return Err(crate::FloraError::Config(
                "ingest.batch_size must be greater than zero".to_string(),
            ));
        }
        if self.export.max_triples_per_chunk == 0 || self.export.page_size == 0 {
            return Err(crate::FloraError::Config(
                "export.max_triples_per_chunk and export.page_size must be greater than zero"
                    .to_string(),
            ));
        }
        check_http_url("export.base_uri", &self.export.base_uri)?;
        check_http_url("download.url", &self.download.url)?;
        check_http_url("download.taxonomy_url", &self.download.taxonomy_url)?;
        check_http_url("download.wgsrpd_url", &self.download.wgsrpd_url)?;
        if let Some(endpoint) = &self.graph.endpoint {
            check_url("graph.endpoint", endpoint, BOLT_SCHEMES)?;
        }
        if self.graph.batch_size == 0 {
            return Err(crate::FloraError::Config(
                "graph.batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

const HTTP_SCHEMES: &[&str] = &["http", "https"];

/// Schemes the Bolt driver connects with
const BOLT_SCHEMES: &[&str] = &["bolt", "bolt+s", "bolt+ssc", "neo4j", "neo4j+s", "neo4j+ssc"];

fn check_http_url(field: &str, value: &str) -> Result<(), crate::FloraError> {
    check_url(field, value, HTTP_SCHEMES)
}

fn check_url(field: &str, value: &str, schemes: &[&str]) -> Result<(), crate::FloraError> {
    let parsed = url::Url::parse(value)
        .map_err(|e| crate::FloraError::Config(format!("{} is not a valid URL: {}", field, e)))?;
    if schemes.contains(&parsed.scheme()) {
        Ok(())
    } else {
        Err(crate::FloraError::Config(format!(
            "{} must use one of {}, got {}",
            field,
            schemes.join(", "),
            parsed.scheme()
        )))
    }
}

pub fn default_config() -> Config {
    Config::default()
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, crate::FloraError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| crate::FloraError::Config(format!("Failed to parse config: {}", e)))?;
    config.validate()?;
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(path: P, config: &Config) -> Result<(), crate::FloraError> {
    let contents = toml::to_string_pretty(config)
        .map_err(|e| crate::FloraError::Config(format!("Failed to serialize config: {}", e)))?;
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}
