//! Device model and identity types.
//!
//! A device model is the remote-defined description of the attributes and
//! actions an enrolled identity must expose. Models are resolved once at
//! startup and are immutable afterwards. The attribute set is implicit:
//! whatever property names the local registry holds at push time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A resolved device model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceModel {
    /// The model's URN, e.g. `urn:dev:wot:example:sensor`.
    pub urn: String,
    /// Short model name, used to derive the enrollment hardware id.
    pub name: String,
    /// Optional human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// Actions the remote side may invoke on enrolled devices.
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

impl DeviceModel {
    /// Creates a model with no actions.
    pub fn new(urn: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            urn: urn.into(),
            name: name.into(),
            description: None,
            actions: Vec::new(),
        }
    }

    /// Adds action descriptors to the model.
    pub fn with_actions(mut self, actions: Vec<ActionSpec>) -> Self {
        self.actions = actions;
        self
    }
}

/// One action descriptor within a device model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    /// The action name, matched against registry resource names.
    pub name: String,
    /// The alias the remote side invokes the action under.
    pub alias: String,
}

impl ActionSpec {
    /// Creates an action descriptor.
    pub fn new(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: alias.into(),
        }
    }
}

/// Remote-issued identity of one enrolled endpoint.
///
/// Opaque to the bridge; valid for the lifetime of one enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Wraps a remote-assigned identity token.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
