//! Agent identity, permission grant and credential types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an agent principal.
///
/// `Active` and `Suspended` may alternate; `Revoked` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Suspended,
    Revoked,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Active => "active",
            AgentStatus::Suspended => "suspended",
            AgentStatus::Revoked => "revoked",
        };
        f.write_str(s)
    }
}

/// Breadth of a permission grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionScope {
    Own,
    Team,
    Organization,
    Global,
}

/// A direct grant of actions on a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionGrant {
    /// Resource name, `"*"`, or a prefix pattern ending in `*` (e.g. `"workflows/*"`).
    pub resource: String,
    /// Permitted actions; `"*"` permits every action.
    pub actions: Vec<String>,
    pub scope: PermissionScope,
    #[serde(default)]
    pub constraints: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub granted_at: DateTime<Utc>,
}

impl PermissionGrant {
    /// A grant of `actions` on `resource` with no expiry or constraints.
    pub fn new<I, S>(resource: impl Into<String>, actions: I, scope: PermissionScope) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resource: resource.into(),
            actions: actions.into_iter().map(Into::into).collect(),
            scope,
            constraints: BTreeMap::new(),
            expires_at: None,
            granted_at: Utc::now(),
        }
    }

    /// Stop honouring the grant at `expires_at`.
    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Attach a free-form constraint.
    pub fn with_constraint(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.constraints.insert(key.into(), value);
        self
    }

    /// Whether the grant has lapsed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|e| e <= now)
    }
}

/// A governed agent principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub status: AgentStatus,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<PermissionGrant>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentIdentity {
    /// An active identity with no roles or grants.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            owner: None,
            status: AgentStatus::Active,
            roles: Vec::new(),
            permissions: Vec::new(),
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a role from the fixed role table.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Set the owning team or person.
    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// Mutable descriptive fields of an identity.
#[derive(Debug, Clone, Default)]
pub struct AgentUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
}

/// Kind of credential; each kind has its own value prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    ApiKey,
    BearerToken,
    Certificate,
    ServiceAccount,
}

impl CredentialType {
    /// Namespace prefix of generated credential values.
    pub fn prefix(self) -> &'static str {
        match self {
            CredentialType::ApiKey => "wak",
            CredentialType::BearerToken => "wbt",
            CredentialType::Certificate => "wcert",
            CredentialType::ServiceAccount => "wsa",
        }
    }
}

/// How often a credential should be rotated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationPolicy {
    pub interval_days: u32,
    #[serde(default)]
    pub auto_rotate: bool,
}

/// A secret issued to an agent.
///
/// `Debug` output redacts `value`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCredential {
    pub id: String,
    pub agent_id: String,
    pub credential_type: CredentialType,
    pub value: String,
    pub issued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_policy: Option<RotationPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotated_from: Option<String>,
}

impl AgentCredential {
    /// Whether the credential is past `expires_at` at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|e| e <= now)
    }
}

impl fmt::Debug for AgentCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentCredential")
            .field("id", &self.id)
            .field("agent_id", &self.agent_id)
            .field("credential_type", &self.credential_type)
            .field("value", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("rotation_policy", &self.rotation_policy)
            .field("rotated_from", &self.rotated_from)
            .finish()
    }
}
