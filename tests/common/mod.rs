//! Shared fixtures for integration tests
#![allow(dead_code)]
use florakb::core::config::Config;
use florakb::core::pipeline::{CancellationFlag, Pipeline};
use florakb::report::RunSummary;
use florakb::storage::sqlite::SqliteStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub fn data_file(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

pub fn names_sample() -> PathBuf {
    data_file("wcvp_names_sample.csv")
}

pub fn distribution_sample() -> PathBuf {
    data_file("wcvp_distribution_sample.csv")
}

/// A file-backed store inside its own temporary directory
pub struct TestStore {
    pub dir: TempDir,
    pub store: SqliteStore,
}

impl TestStore {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db = dir.path().join("florakb.db");
        let store = SqliteStore::open(&db.display().to_string(), 5000).expect("Failed to open store");
        TestStore { dir, store }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(Arc::new(self.store.clone()), Config::default())
    }

    pub fn import_names(&self) -> RunSummary {
        self.pipeline()
            .run_file(names_sample(), &CancellationFlag::new())
            .expect("names import failed")
    }

    pub fn import_distributions(&self) -> RunSummary {
        self.pipeline()
            .run_distribution_file(distribution_sample(), &CancellationFlag::new())
            .expect("distribution import failed")
    }
}
