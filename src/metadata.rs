//! Interface description file.
//!
//! Operators describe interfaces in YAML; descriptions become `ifAlias`.
//!
//! ```yaml
//! interfaces:
//!   eth0:
//!     description: "Uplink"
//!     sub-interfaces:
//!       100:
//!         description: "Customer VLAN"
//! loopbacks:
//!   loop0:
//!     description: "Router ID"
//! ```

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::Deserialize;

/// Errors loading the description file.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Described {
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PhysicalInterface {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "sub-interfaces")]
    pub sub_interfaces: BTreeMap<u32, Described>,
}

/// Parsed description file.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub interfaces: BTreeMap<String, PhysicalInterface>,
    #[serde(default)]
    pub loopbacks: BTreeMap<String, Described>,
}

impl Metadata {
    pub fn from_yaml(yaml: &str) -> Result<Self, MetadataError> {
        // An empty document deserializes to unit, not to an empty map.
        if yaml.trim().is_empty() {
            return Ok(Metadata::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, MetadataError> {
        let content = std::fs::read_to_string(path).map_err(|source| MetadataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let metadata = Self::from_yaml(&content)?;
        log::info!(
            "Loaded descriptions for {} interfaces and {} loopbacks from {}",
            metadata.interfaces.len(),
            metadata.loopbacks.len(),
            path.display()
        );
        Ok(metadata)
    }

    /// Description of `ifname`; sub-interfaces are named `<parent>.<id>`.
    pub fn description(&self, ifname: &str) -> Option<&str> {
        if let Some(iface) = self.interfaces.get(ifname) {
            return iface.description.as_deref();
        }
        if let Some(lo) = self.loopbacks.get(ifname) {
            return lo.description.as_deref();
        }

        let (parent, id) = ifname.rsplit_once('.')?;
        let id: u32 = id.parse().ok()?;
        self.interfaces
            .get(parent)?
            .sub_interfaces
            .get(&id)?
            .description
            .as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
interfaces:
  eth0:
    description: "Uplink"
    sub-interfaces:
      100:
        description: "Customer VLAN"
      200: {}
  eth1: {}
loopbacks:
  loop0:
    description: "Router ID"
"#;

    #[test]
    fn test_descriptions() {
        let md = Metadata::from_yaml(YAML).unwrap();
        assert_eq!(md.description("eth0"), Some("Uplink"));
        assert_eq!(md.description("eth0.100"), Some("Customer VLAN"));
        assert_eq!(md.description("eth0.200"), None);
        assert_eq!(md.description("eth0.300"), None);
        assert_eq!(md.description("eth1"), None);
        assert_eq!(md.description("loop0"), Some("Router ID"));
        assert_eq!(md.description("eth9"), None);
        assert_eq!(md.description("eth0.x"), None);
    }

    #[test]
    fn test_empty_document() {
        let md = Metadata::from_yaml("").unwrap();
        assert!(md.interfaces.is_empty());
        assert!(md.loopbacks.is_empty());
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            Metadata::from_yaml("interfaces: [1, 2"),
            Err(MetadataError::Yaml(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("descriptions.yaml");
        std::fs::write(&path, YAML).unwrap();
        let md = Metadata::from_file(&path).unwrap();
        assert_eq!(md.description("loop0"), Some("Router ID"));

        assert!(matches!(
            Metadata::from_file(&dir.path().join("missing.yaml")),
            Err(MetadataError::Io { .. })
        ));
    }
}
