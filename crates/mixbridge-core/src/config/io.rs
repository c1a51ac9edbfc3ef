//! YAML file I/O shared by settings and the chain preset store

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load a YAML file, distinguishing "missing" from "broken"
///
/// Returns `Ok(None)` when the file does not exist and an error when it
/// exists but cannot be read or parsed.
pub fn try_load_config<T>(path: &Path) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {:?}", path))?;
    let value = serde_yaml::from_str::<T>(&contents)
        .with_context(|| format!("Failed to parse {:?}", path))?;
    Ok(Some(value))
}

/// Load a YAML file, falling back to `T::default()`
///
/// A missing file is normal on first start. A broken file is logged and
/// replaced by defaults so startup never fails on bad settings.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    match try_load_config(path) {
        Ok(Some(config)) => {
            log::info!("load_config: loaded {:?}", path);
            config
        }
        Ok(None) => {
            log::info!("load_config: {:?} doesn't exist, using defaults", path);
            T::default()
        }
        Err(e) => {
            log::warn!("load_config: {:#}, using defaults", e);
            T::default()
        }
    }
}

/// Save a value as YAML, creating parent directories as needed
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize to YAML")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write {:?}", path))?;

    log::debug!("save_config: wrote {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        count: i32,
        label: String,
    }

    #[test]
    fn test_missing_file_is_none_and_default() {
        let path = Path::new("/nonexistent/mixbridge/settings.yaml");
        assert!(try_load_config::<Sample>(path).unwrap().is_none());
        assert_eq!(load_config::<Sample>(path), Sample::default());
    }

    #[test]
    fn test_broken_file_errors_but_load_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "count: [not a number").unwrap();

        assert!(try_load_config::<Sample>(&path).is_err());
        assert_eq!(load_config::<Sample>(&path), Sample::default());
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sample.yaml");

        let value = Sample {
            count: 3,
            label: "deck".to_string(),
        };
        save_config(&value, &path).unwrap();

        let loaded: Sample = load_config(&path);
        assert_eq!(loaded, value);
    }
}
