use std::path::PathBuf;
use std::sync::OnceLock;

// Cache the paths to avoid repeated environment lookups
static FLORAKB_HOME: OnceLock<PathBuf> = OnceLock::new();
static FLORAKB_DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Get the florakb home directory
/// Checks FLORAKB_HOME environment variable, falls back to ${HOME}/.florakb
pub fn florakb_home() -> PathBuf {
    FLORAKB_HOME
        .get_or_init(|| {
            if let Ok(path) = std::env::var("FLORAKB_HOME") {
                PathBuf::from(path)
            } else {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".florakb")
            }
        })
        .clone()
}

/// Get the data directory (downloads, exports)
/// Checks FLORAKB_DATA_DIR environment variable, falls back to FLORAKB_HOME/data
pub fn florakb_data_dir() -> PathBuf {
    FLORAKB_DATA_DIR
        .get_or_init(|| {
            if let Ok(path) = std::env::var("FLORAKB_DATA_DIR") {
                PathBuf::from(path)
            } else {
                florakb_home().join("data")
            }
        })
        .clone()
}

pub fn default_config_path() -> PathBuf {
    florakb_home().join("config.toml")
}

pub fn default_database_path() -> PathBuf {
    florakb_home().join("florakb.db")
}

pub fn default_export_path() -> PathBuf {
    florakb_data_dir().join("triples.tar.gz")
}

pub fn default_graph_path() -> PathBuf {
    florakb_home().join("graph.db")
}
