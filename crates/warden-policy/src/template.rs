//! TOML policy catalogs.
//!
//! A catalog document holds an ordered list of policies:
//!
//! ```toml
//! [[policies]]
//! id = "cost-limit"
//! name = "Cost Limit"
//! category = "cost_control"
//! severity = "medium"
//! action = "require_approval"
//!
//! [[policies.conditions]]
//! type = "estimated_cost"
//! operator = "less_than"
//! value = 100
//! ```
//!
//! The default template catalog ships embedded in the binary.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use warden_contracts::{
    error::{WardenError, WardenResult},
    policy::Policy,
};

const DEFAULT_TEMPLATES: &str = include_str!("../policies/default.toml");

/// A list of policies as read from a `[[policies]]` TOML document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyCatalog {
    #[serde(default)]
    pub policies: Vec<Policy>,
}

impl PolicyCatalog {
    /// Parse `s` as a TOML policy catalog.
    ///
    /// Returns `WardenError::ConfigError` if the TOML is malformed, does not
    /// match the schema, or declares the same policy id twice.
    pub fn from_toml_str(s: &str) -> WardenResult<Self> {
        let catalog: PolicyCatalog = toml::from_str(s).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to parse policy TOML: {}", e),
        })?;

        let mut seen = HashSet::new();
        for policy in &catalog.policies {
            if !seen.insert(policy.id.as_str()) {
                return Err(WardenError::ConfigError {
                    reason: format!("policy id '{}' is declared more than once", policy.id),
                });
            }
        }
        Ok(catalog)
    }

    /// Read and parse the catalog at `path`.
    pub fn from_file(path: &Path) -> WardenResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to read policy file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// The embedded default templates.
    pub fn default_templates() -> WardenResult<Self> {
        Self::from_toml_str(DEFAULT_TEMPLATES)
    }

    /// Number of policies in the catalog.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether the catalog holds no policies.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use warden_contracts::{policy::EnforcementAction, severity::Severity};

    use super::*;

    #[test]
    fn default_templates_parse() {
        let catalog = PolicyCatalog::default_templates().unwrap();
        assert_eq!(catalog.len(), 8);

        let deletion = catalog
            .policies
            .iter()
            .find(|p| p.id == "no-restricted-deletion")
            .unwrap();
        assert_eq!(deletion.severity, Severity::Critical);
        assert_eq!(deletion.action, EnforcementAction::Block);
        assert_eq!(deletion.conditions.len(), 1);
        assert!(catalog.policies.iter().all(|p| p.enabled));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let doc = r#"
            [[policies]]
            id = "dup"
            name = "A"
            category = "security"
            severity = "low"
            action = "warn"

            [[policies]]
            id = "dup"
            name = "B"
            category = "security"
            severity = "low"
            action = "warn"
        "#;
        let err = PolicyCatalog::from_toml_str(doc).unwrap_err();
        assert!(matches!(err, WardenError::ConfigError { .. }));
    }

    #[test]
    fn unknown_condition_type_is_config_error() {
        let doc = r#"
            [[policies]]
            id = "p"
            name = "P"
            category = "security"
            severity = "low"
            action = "warn"

            [[policies.conditions]]
            type = "moon_phase"
            operator = "equals"
            value = "full"
        "#;
        assert!(PolicyCatalog::from_toml_str(doc).is_err());
    }

    #[test]
    fn empty_document_is_an_empty_catalog() {
        assert!(PolicyCatalog::from_toml_str("").unwrap().is_empty());
    }
}
