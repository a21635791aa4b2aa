use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Persists the daily API call counter as a plain integer string so a
/// restart within the same day keeps counting from where it left off.
#[derive(Debug, Clone)]
pub struct CounterStore {
    path: PathBuf,
}

impl CounterStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Raw persisted value, if any. Validation is the coordinator's job.
    pub fn load(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Some(raw),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to read counter state");
                None
            }
        }
    }

    pub fn save(&self, value: u64) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&self.path, value.to_string())
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}
