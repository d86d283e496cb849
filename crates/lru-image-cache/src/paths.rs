//! Local file naming for cached objects

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const DEFAULT_EXTENSION: &str = ".jpg";

#[derive(Debug, Clone)]
pub struct PathNaming {
    base_dir: PathBuf,
}

impl PathNaming {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Generate a file stem from a key
    pub fn hash_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Same key, same path
    pub fn deterministic(&self, key: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}{}", Self::hash_key(key), extension(key)))
    }

    /// Fresh path on every call, used for mutable sources
    pub fn unique(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!(
            "{}-{}{}",
            Self::hash_key(key),
            Uuid::new_v4().simple(),
            extension(key)
        ))
    }
}

/// Extension of the key's last segment including the dot, `.jpg` if none
fn extension(key: &str) -> &str {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.rfind('.') {
        Some(index) if index + 1 < name.len() => &name[index..],
        _ => DEFAULT_EXTENSION,
    }
}
