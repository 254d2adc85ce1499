//! Template entity: immutable-once-published deployment blueprint.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::errors::{HosterError, HosterResult};
use crate::naming::slugify;

/// A declared variable the template's Compose document interpolates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Variable name, e.g. `DB_PASSWORD`.
    pub name: String,
    /// Declared type, used by the outer UI layer for input rendering.
    pub kind: VariableType,
    /// Whether a deployment must supply a non-empty value.
    pub required: bool,
    /// Valid choices when `kind == VariableType::Select`.
    pub options: Vec<String>,
}

/// Declared type of a [`Variable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    /// Free-form text.
    String,
    /// Numeric input.
    Number,
    /// Boolean toggle.
    Boolean,
    /// Text input that should be masked/secret in the UI.
    Password,
    /// One of a fixed set of `options`.
    Select,
}

/// A file materialized onto disk before containers start, then copied into each container
/// of the deployment (not bind-mounted: the source path only exists on whichever host ran
/// the orchestrator, which for an SSH-tunneled node is never the Docker daemon's own host).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Logical name used to derive the on-disk file name.
    pub name: String,
    /// Absolute in-container path the file is bind-mounted to.
    pub mount_path: String,
    /// File contents.
    pub content: String,
    /// POSIX file mode; defaults to `0o644`.
    pub mode: u32,
}

impl ConfigFile {
    /// Mode applied when a template does not declare one.
    pub const DEFAULT_MODE: u32 = 0o644;
}

use super::Resources;

/// Immutable-once-published application blueprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Stable reference id.
    pub id: Uuid,
    /// Human-readable display name.
    pub name: String,
    /// Semver triple, e.g. `1.4.0`.
    pub version: (u64, u64, u64),
    /// Raw Compose document text.
    pub compose: String,
    /// Declared variables.
    pub variables: Vec<Variable>,
    /// Declared config files.
    pub config_files: Vec<ConfigFile>,
    /// Declared resource footprint.
    pub resources: Resources,
    /// Capability tags a hosting node must have.
    pub required_capabilities: HashSet<String>,
    /// Price in cents per month.
    pub price_cents: i64,
    /// Whether the template is published (and therefore instantiable).
    pub published: bool,
    /// Id of the user who owns the template (and the nodes it may run on).
    pub creator_id: Uuid,
}

impl Template {
    /// URL-safe slug derived from `name`. A pure function of `name`.
    #[must_use]
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    /// Publishes the template.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::HosterError::AlreadyPublished`] if already published.
    pub fn publish(&mut self) -> Result<(), crate::errors::HosterError> {
        if self.published {
            return Err(crate::errors::HosterError::AlreadyPublished { id: self.id });
        }
        self.published = true;
        Ok(())
    }

    /// Returns whether the named field set may still be edited.
    ///
    /// Unpublished templates may be edited freely; published templates are immutable
    /// except for the `published` flag itself (to un-publish).
    #[must_use]
    pub fn is_editable(&self) -> bool {
        !self.published
    }

    /// Checks that every required [`Variable`] has a non-empty entry in `provided`.
    ///
    /// # Errors
    ///
    /// Returns [`HosterError::MissingVariable`] naming the first required variable absent
    /// or empty in `provided`, in declaration order.
    pub fn validate_variables(&self, provided: &HashMap<String, String>) -> HosterResult<()> {
        for variable in &self.variables {
            if !variable.required {
                continue;
            }
            let supplied = provided.get(&variable.name).is_some_and(|v| !v.is_empty());
            if !supplied {
                return Err(HosterError::MissingVariable {
                    name: variable.name.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Template {
        Template {
            id: Uuid::new_v4(),
            name: "Nginx Reverse Proxy".to_string(),
            version: (1, 0, 0),
            compose: "services:\n  web:\n    image: nginx:alpine\n".to_string(),
            variables: vec![],
            config_files: vec![],
            resources: Resources {
                cpu_cores: 0.5,
                memory_mb: 256,
                disk_mb: 1024,
            },
            required_capabilities: HashSet::new(),
            price_cents: 500,
            published: false,
            creator_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn slug_is_pure_function_of_name() {
        let t = sample();
        assert_eq!(t.slug(), "nginx-reverse-proxy");
        assert_eq!(t.slug(), t.slug());
    }

    #[test]
    fn publish_twice_fails() {
        let mut t = sample();
        t.publish().unwrap();
        assert!(t.published);
        assert!(t.publish().is_err());
    }

    #[test]
    fn unpublished_is_editable() {
        let t = sample();
        assert!(t.is_editable());
    }

    #[test]
    fn missing_required_variable_is_rejected() {
        let mut t = sample();
        t.variables.push(Variable {
            name: "DB_PASSWORD".to_string(),
            kind: VariableType::Password,
            required: true,
            options: vec![],
        });
        let err = t.validate_variables(&HashMap::new()).unwrap_err();
        assert!(matches!(err, HosterError::MissingVariable { name } if name == "DB_PASSWORD"));
    }

    #[test]
    fn empty_string_does_not_satisfy_required_variable() {
        let mut t = sample();
        t.variables.push(Variable {
            name: "DB_PASSWORD".to_string(),
            kind: VariableType::Password,
            required: true,
            options: vec![],
        });
        let mut provided = HashMap::new();
        provided.insert("DB_PASSWORD".to_string(), String::new());
        assert!(t.validate_variables(&provided).is_err());
    }

    #[test]
    fn optional_variable_may_be_absent() {
        let mut t = sample();
        t.variables.push(Variable {
            name: "EXTRA_FLAG".to_string(),
            kind: VariableType::Boolean,
            required: false,
            options: vec![],
        });
        assert!(t.validate_variables(&HashMap::new()).is_ok());
    }

    #[test]
    fn supplied_required_variable_passes() {
        let mut t = sample();
        t.variables.push(Variable {
            name: "DB_PASSWORD".to_string(),
            kind: VariableType::Password,
            required: true,
            options: vec![],
        });
        let mut provided = HashMap::new();
        provided.insert("DB_PASSWORD".to_string(), "hunter2".to_string());
        assert!(t.validate_variables(&provided).is_ok());
    }
}
