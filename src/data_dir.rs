//! Local state lives under one root:
//!
//! ```text
//! <root>/
//!   documents/                default ingestion source
//!   embeddings/<index>.redb   one embeddings cache per index
//! ```

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable consulted when no root is passed explicitly.
pub const DATA_DIR_ENV: &str = "DOCRAG_DATA_DIR";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Use `root` as the data directory, creating it when absent.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;
        Ok(Self { root })
    }

    /// `explicit` wins, then `$DOCRAG_DATA_DIR`, then `$XDG_DATA_HOME/docrag`.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit.map(Path::to_path_buf).or_else(root_from_env) {
            Some(root) => Self::at(root),
            None => Self::at(xdg_data_home()?),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Embeddings cache for `index`. Characters that are unsafe in a file
    /// name are replaced with `_`; the `embeddings/` directory itself is
    /// created by the cache on first write.
    pub fn cache_path(&self, index: &str) -> PathBuf {
        let stem: String = index
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join("embeddings").join(format!("{stem}.redb"))
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.root.join("documents")
    }
}

fn root_from_env() -> Option<PathBuf> {
    std::env::var_os(DATA_DIR_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn xdg_data_home() -> Result<PathBuf> {
    xdg::BaseDirectories::with_prefix("docrag")
        .get_data_home()
        .ok_or_else(|| Error::Config("no XDG data home for docrag".into()))
}
