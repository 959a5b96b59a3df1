//! Workspace configuration (`codeatlas.toml`).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AtlasConfig {
    pub database: Option<String>,
    pub repo: Option<String>,
    pub path: Option<String>,
    pub workers: Option<usize>,
    /// "top_level" or "nested"
    pub extraction_depth: Option<String>,
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("codeatlas.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".codeatlas").join("codeatlas.db")
}

pub fn load_config(path: Option<&Path>) -> Result<Option<AtlasConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: AtlasConfig = toml::from_str(&contents)
        .map_err(|e| Error::Parse(format!("invalid config {}: {}", path.display(), e)))?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &AtlasConfig, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::InvalidArgument(format!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        )));
    }

    let contents = toml::to_string_pretty(config)
        .map_err(|e| Error::Parse(format!("config serialization failed: {}", e)))?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn ensure_gitignore(project_root: &Path) -> Result<()> {
    let gitignore_path = project_root.join(".gitignore");
    let entry = ".codeatlas/";

    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        if existing.lines().any(|line| line.trim() == entry) {
            return Ok(());
        }
    }

    let mut content = String::new();
    if gitignore_path.exists() {
        content.push_str(&std::fs::read_to_string(&gitignore_path)?);
        if !content.ends_with('\n') {
            content.push('\n');
        }
    }
    content.push_str(entry);
    content.push('\n');
    std::fs::write(&gitignore_path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("codeatlas.toml");
        let config = AtlasConfig {
            database: Some(".codeatlas/codeatlas.db".into()),
            repo: Some("app".into()),
            ..Default::default()
        };
        write_config(&path, &config, false).unwrap();
        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.repo.as_deref(), Some("app"));
    }

    #[test]
    fn test_write_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("codeatlas.toml");
        write_config(&path, &AtlasConfig::default(), false).unwrap();
        assert!(write_config(&path, &AtlasConfig::default(), false).is_err());
        write_config(&path, &AtlasConfig::default(), true).unwrap();
    }

    #[test]
    fn test_gitignore_entry_added_once() {
        let dir = TempDir::new().unwrap();
        ensure_gitignore(dir.path()).unwrap();
        ensure_gitignore(dir.path()).unwrap();
        let content = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(content.matches(".codeatlas/").count(), 1);
    }
}
