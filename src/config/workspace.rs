//! The workspace: a root storage path plus an isolated namespace.
//!
//! Every table of one pipeline run lives under `<root>/<namespace>/`. The
//! workspace is an explicit value passed to every stage; nothing in the crate
//! keeps a current namespace in ambient state.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::util::IoResultExt;
use crate::error::{PipelineError, Result};
use crate::utils::logging::log_operation_start;

/// Prefix of namespaces derived from a user name
pub const NAMESPACE_PREFIX: &str = "ehrdemo";

/// Catalog file name inside the namespace directory
pub const CATALOG_FILE: &str = "_catalog.json";

/// Root path and namespace identifier of one pipeline workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub root: PathBuf,
    pub namespace: String,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(std::env::temp_dir(), NAMESPACE_PREFIX)
    }
}

impl Workspace {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            namespace: namespace.into(),
        }
    }

    /// Workspace whose namespace is derived from a user name
    #[must_use]
    pub fn for_user(root: impl Into<PathBuf>, user: &str) -> Self {
        Self::new(root, namespace_for_user(user))
    }

    /// Directory holding every table of this namespace
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.root.join(&self.namespace)
    }

    /// Directory of one table
    #[must_use]
    pub fn table_path(&self, table: &str) -> PathBuf {
        self.path().join(table)
    }

    #[must_use]
    pub fn catalog_path(&self) -> PathBuf {
        self.path().join(CATALOG_FILE)
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path().is_dir()
    }

    /// Check the namespace is a single safe path component
    pub fn validate(&self) -> Result<()> {
        let ns = &self.namespace;
        let valid = !ns.is_empty()
            && ns
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if valid {
            Ok(())
        } else {
            Err(PipelineError::Config(format!(
                "namespace '{ns}' must be non-empty and contain only a-z, 0-9 and '_'"
            )))
        }
    }

    /// Create the namespace directory
    ///
    /// With `recreate`, an existing namespace and every table in it is
    /// removed first, so the run starts from an empty namespace.
    pub fn provision(&self, recreate: bool) -> Result<()> {
        self.validate()?;
        let path = self.path();
        if recreate && path.exists() {
            log_operation_start("Dropping namespace", &path);
            fs::remove_dir_all(&path).at_path(&path)?;
        }
        fs::create_dir_all(&path).at_path(&path)?;
        log::info!("Namespace '{}' ready at {}", self.namespace, path.display());
        Ok(())
    }
}

/// Derive a namespace from a user name: lowercase alphanumerics only,
/// prefixed with `ehrdemo_`
#[must_use]
pub fn namespace_for_user(user: &str) -> String {
    let cleaned: String = user
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if cleaned.is_empty() {
        NAMESPACE_PREFIX.to_string()
    } else {
        format!("{NAMESPACE_PREFIX}_{cleaned}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_strips_punctuation_and_case() {
        assert_eq!(namespace_for_user("Jane.Doe@example.com"), "ehrdemo_janedoeexamplecom");
        assert_eq!(namespace_for_user("@@"), "ehrdemo");
    }

    #[test]
    fn namespace_must_be_a_safe_component() {
        assert!(Workspace::new("/tmp", "ehrdemo_jane").validate().is_ok());
        assert!(Workspace::new("/tmp", "../etc").validate().is_err());
        assert!(Workspace::new("/tmp", "").validate().is_err());
    }

    #[test]
    fn provision_recreate_empties_namespace() {
        let root = tempfile::tempdir().expect("tempdir");
        let ws = Workspace::new(root.path(), "ehrdemo_test");
        ws.provision(false).expect("provision");
        fs::write(ws.path().join("stale"), b"x").expect("write");

        ws.provision(false).expect("provision keeps content");
        assert!(ws.path().join("stale").exists());

        ws.provision(true).expect("recreate");
        assert!(ws.exists());
        assert!(!ws.path().join("stale").exists());
    }
}
