//! Settings of an explorer instance.

use crate::document::NameValidator;
use crate::error::Result;
use crate::types::{builtin_types, DocumentType, DocumentTypeRegistry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_NAME_PATTERN: &str = r"^[a-zA-Z0-9_\- \.\(\)]{1,}$";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    pub data_dir: PathBuf,
    pub system_name: String,
    pub system_uuid: String,
    pub name_pattern: String,
    pub default_min_depth: usize,
    pub event_capacity: usize,
    pub administrators: Vec<String>,
    pub document_types: Vec<DocumentType>,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            system_name: "System".to_string(),
            system_uuid: "0".to_string(),
            name_pattern: DEFAULT_NAME_PATTERN.to_string(),
            default_min_depth: 1,
            event_capacity: 100,
            administrators: Vec::new(),
            document_types: builtin_types(),
        }
    }
}

impl ExplorerConfig {
    /// Read a JSON config file; missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Defaults overlaid with `EXPLORER_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    pub fn overlay<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("EXPLORER_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(admins) = lookup("EXPLORER_ADMINS") {
            self.administrators = admins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(pattern) = lookup("EXPLORER_NAME_PATTERN") {
            self.name_pattern = pattern;
        }
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn tree_path(&self) -> PathBuf {
        self.data_dir.join("tree.json")
    }

    pub fn documents_path(&self) -> PathBuf {
        self.data_dir.join("documents.json")
    }

    pub fn acl_path(&self) -> PathBuf {
        self.data_dir.join("acl.json")
    }

    pub fn name_validator(&self) -> Result<NameValidator> {
        NameValidator::new(&self.name_pattern)
    }

    pub fn registry(&self) -> DocumentTypeRegistry {
        DocumentTypeRegistry::new(self.document_types.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_fields_take_defaults() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("explorer.json");
        std::fs::write(&path, r#"{"data_dir": "/srv/explorer", "default_min_depth": 2}"#).unwrap();
        let config = ExplorerConfig::load(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/explorer"));
        assert_eq!(config.default_min_depth, 2);
        assert_eq!(config.system_name, "System");
        assert_eq!(config.document_types.len(), 12);
        assert_eq!(config.tree_path(), PathBuf::from("/srv/explorer/tree.json"));
    }

    #[test]
    fn environment_overlay() {
        let env: HashMap<&str, &str> = [
            ("EXPLORER_DATA_DIR", "/tmp/x"),
            ("EXPLORER_ADMINS", "alice, bob,,"),
        ]
        .into_iter()
        .collect();
        let config = ExplorerConfig::default().overlay(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/x"));
        assert_eq!(config.administrators, vec!["alice", "bob"]);
        assert_eq!(config.name_pattern, DEFAULT_NAME_PATTERN);
    }

    #[test]
    fn bad_name_pattern_is_rejected() {
        let config = ExplorerConfig {
            name_pattern: "(".to_string(),
            ..ExplorerConfig::default()
        };
        assert!(config.name_validator().is_err());
    }
}
