//! YAML file helpers for configuration values.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum YamlError {
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML serialization failed")]
    Serde(#[from] serde_yml::Error),
}

pub fn from_str<T: DeserializeOwned>(text: &str) -> Result<T, YamlError> {
    Ok(serde_yml::from_str(text)?)
}

pub fn to_string<T: Serialize>(value: &T) -> Result<String, YamlError> {
    Ok(serde_yml::to_string(value)?)
}

pub fn read_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, YamlError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| YamlError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    from_str(&text)
}

pub fn write_file<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<(), YamlError> {
    let path = path.as_ref();
    let text = to_string(value)?;
    std::fs::write(path, text).map_err(|source| YamlError::Write {
        path: path.to_path_buf(),
        source,
    })
}
