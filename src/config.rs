//! `rowbind.toml` - which database a session opens and how chatty saves are

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "rowbind.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RowbindConfig {
    /// Database file; an in-memory store is used when unset
    pub database: Option<String>,
    /// Log every saved object at info level
    #[serde(default)]
    pub debug: bool,
}

impl RowbindConfig {
    /// Config pointing at `database`
    pub fn for_database(database: &Path) -> Self {
        Self {
            database: Some(database.to_string_lossy().into_owned()),
            debug: false,
        }
    }

    /// Read the config at `path`; `None` when the file does not exist
    pub fn load(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(config))
    }

    /// Write the config to `path`, refusing to replace an existing file unless forced
    pub fn save(&self, path: &Path, force: bool) -> anyhow::Result<()> {
        if path.exists() && !force {
            anyhow::bail!("{} already exists (pass --force to replace it)", path.display());
        }
        std::fs::write(path, toml::to_string_pretty(self)?)
            .with_context(|| format!("writing {}", path.display()))
    }

    /// The configured database file, if any
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database.as_deref().map(PathBuf::from)
    }
}

/// `rowbind.toml` in the working directory
pub fn default_config_path() -> PathBuf {
    PathBuf::from(CONFIG_FILE)
}

/// `<base>/.rowbind/rowbind.db`
pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".rowbind").join("rowbind.db")
}

/// Create the directory a database file will live in
pub fn ensure_db_dir(db_path: &Path) -> crate::Result<()> {
    if let Some(dir) = db_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        tracing::debug!("Creating {}", dir.display());
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}
