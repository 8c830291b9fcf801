use crate::index::types::{
    DATA_FNAME, DICTIONARY_FNAME, DOCINFO_FNAME, IndexConfig, META_FNAME, SCORES_FNAME,
};
use anyhow::{Context, Result};
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

const APP_NAME: &str = "hashdex";
const CONFIG_FILE: &str = "config.json";
const INDEXES_DIR: &str = "indexes";

/// Get the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    let app_dir = get_app_data_dir()?;
    Ok(app_dir.join(CONFIG_FILE))
}

/// Get the application data directory for storing indexes
pub fn get_app_data_dir() -> Result<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        // Linux/Unix: XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };

    let base = base.context("Could not determine app data directory")?;
    let app_dir = base.join(APP_NAME);

    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

/// Load the user's index configuration, or defaults if none is saved
pub fn load_config() -> Result<IndexConfig> {
    load_config_from(&get_config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<IndexConfig> {
    if !path.exists() {
        return Ok(IndexConfig::default());
    }

    let content = fs::read_to_string(path).context("Failed to read config file")?;
    let config: IndexConfig =
        serde_json::from_str(&content).context("Failed to parse config file")?;
    config.validate().context("Invalid config file")?;
    Ok(config)
}

/// Save the index configuration to the app data directory
pub fn save_config(config: &IndexConfig) -> Result<()> {
    save_config_to(config, &get_config_path()?)
}

pub fn save_config_to(config: &IndexConfig, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(path, content).context("Failed to write config file")?;
    Ok(())
}

/// Default index directory for a corpus root
pub fn get_index_dir(root_path: &Path) -> Result<PathBuf> {
    let indexes_dir = get_app_data_dir()?.join(INDEXES_DIR);
    fs::create_dir_all(&indexes_dir)?;
    Ok(indexes_dir.join(hash_path(root_path)))
}

/// Resolve where an index lives: an explicit directory wins over the corpus default
pub fn resolve_index_dir(index_dir: Option<&Path>, root_path: &Path) -> Result<PathBuf> {
    match index_dir {
        Some(dir) => Ok(dir.to_path_buf()),
        None => get_index_dir(root_path),
    }
}

/// Hash a path to create a unique folder name
/// Format: first 16 chars of dir name + hash
fn hash_path(path: &Path) -> String {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let path_str = canonical.to_string_lossy();

    let dir_name = canonical
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");

    let sanitized: String = dir_name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .take(16)
        .collect();

    let mut hasher = DefaultHasher::new();
    path_str.hash(&mut hasher);
    let hash = hasher.finish();

    format!("{}-{:016x}", sanitized, hash)
}

/// Whether `index_dir` holds a committed index
pub fn is_committed(index_dir: &Path) -> bool {
    index_dir.join(META_FNAME).exists()
}

/// Whether `name` is a file written by the indexer: a main, segment or
/// merge-temporary table, meta.json or the score table
fn is_index_file(name: &str) -> bool {
    if matches!(name, META_FNAME | SCORES_FNAME) {
        return true;
    }
    [DICTIONARY_FNAME, DATA_FNAME, DOCINFO_FNAME].iter().any(|base| {
        name.strip_prefix(base).is_some_and(|rest| {
            rest.is_empty() || rest == ".tmp" || rest.bytes().all(|b| b.is_ascii_digit())
        })
    })
}

/// Remove the committed index in `index_dir`.
///
/// Only index files are deleted, meta.json last. The directory itself is
/// removed once nothing else is left in it. Returns `false` when `index_dir`
/// holds no committed index.
pub fn remove_index(index_dir: &Path) -> Result<bool> {
    if !is_committed(index_dir) {
        return Ok(false);
    }

    let entries = fs::read_dir(index_dir)
        .with_context(|| format!("Failed to read {}", index_dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name != META_FNAME && is_index_file(name) && entry.file_type()?.is_file() {
            fs::remove_file(entry.path())
                .with_context(|| format!("Failed to remove {}", entry.path().display()))?;
        }
    }
    fs::remove_file(index_dir.join(META_FNAME))
        .with_context(|| format!("Failed to remove index metadata in {}", index_dir.display()))?;

    // Stays when other files remain
    let _ = fs::remove_dir(index_dir);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hash_path() {
        let hash1 = hash_path(Path::new("/home/user/project"));
        let hash2 = hash_path(Path::new("/home/user/project"));
        let hash3 = hash_path(Path::new("/home/user/other"));

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert!(hash1.starts_with("project-"));
    }

    #[test]
    fn test_missing_config_is_default() {
        let dir = TempDir::new().unwrap();
        let config = load_config_from(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, IndexConfig::default());
    }

    #[test]
    fn test_config_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let config = IndexConfig::with_sizes(1009, 500);

        save_config_to(&config, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, r#"{"table_size": 0}"#).unwrap();
        assert!(load_config_from(&path).is_err());
    }

    #[test]
    fn test_remove_index() {
        let dir = TempDir::new().unwrap();
        let index = dir.path().join("idx");
        fs::create_dir(&index).unwrap();
        fs::write(index.join(META_FNAME), "{}").unwrap();
        assert!(is_committed(&index));

        assert!(remove_index(&index).unwrap());
        assert!(!remove_index(&index).unwrap());
        assert!(!index.exists());
    }

    #[test]
    fn test_remove_index_keeps_foreign_files() {
        let dir = TempDir::new().unwrap();
        for name in ["dictionary", "data3", "docInfo", "dictionary.tmp", "scores", "meta.json"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        for name in ["notes.txt", "database.db", "data-backup", "docInfo.bak"] {
            fs::write(dir.path().join(name), "keep").unwrap();
        }

        assert!(remove_index(dir.path()).unwrap());
        let mut left: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec!["data-backup", "database.db", "docInfo.bak", "notes.txt"]);
    }

    #[test]
    fn test_remove_without_index_touches_nothing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("data"), "user file").unwrap();

        assert!(!remove_index(dir.path()).unwrap());
        assert!(dir.path().join("data").exists());
        assert!(!remove_index(&dir.path().join("missing")).unwrap());
    }

    #[test]
    fn test_index_file_names() {
        assert!(is_index_file("dictionary"));
        assert!(is_index_file("dictionary12"));
        assert!(is_index_file("data.tmp"));
        assert!(is_index_file("docInfo3"));
        assert!(!is_index_file("dictionary.bak"));
        assert!(!is_index_file("datasets"));
        assert!(!is_index_file("readme.md"));
    }
}
