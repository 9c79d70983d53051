//! The agent identity manager.
//!
//! Each agent lives behind its own lock, so permission checks for one agent
//! never wait on writes to another. A value index maps credential secrets
//! to their owning agent for `validate_credential`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use warden_contracts::{
    config::IdentityConfig,
    error::{WardenError, WardenResult},
    event::GovernanceEvent,
    identity::{
        AgentCredential, AgentIdentity, AgentStatus, AgentUpdate, CredentialType,
        PermissionGrant, RotationPolicy,
    },
};
use warden_core::{
    maintenance,
    traits::{EventSink, PermissionChecker},
};

use crate::roles::{self, SYSTEM_ADMIN};

/// Random bytes in a generated credential value.
const SECRET_BYTES: usize = 32;

/// Longest credential lifetime accepted, configured or per call (ten years).
pub const MAX_CREDENTIAL_TTL_HOURS: i64 = 87_600;

struct AgentRecord {
    identity: AgentIdentity,
    credentials: HashMap<String, AgentCredential>,
}

type Shared<T> = Arc<RwLock<T>>;

/// Agent identities, their grants and roles, and issued credentials.
pub struct AgentIdentityManager {
    config: IdentityConfig,
    default_ttl: TimeDelta,
    agents: RwLock<HashMap<String, Shared<AgentRecord>>>,
    /// Credential value → owning agent id.
    by_value: RwLock<HashMap<String, String>>,
    events: Arc<dyn EventSink>,
}

impl AgentIdentityManager {
    /// Create a manager.
    ///
    /// Returns `WardenError::ConfigError` if `default_credential_ttl_hours`
    /// is outside `1..=MAX_CREDENTIAL_TTL_HOURS` or `sweep_interval_secs` is
    /// zero.
    pub fn new(config: IdentityConfig, events: Arc<dyn EventSink>) -> WardenResult<Self> {
        let hours = config.default_credential_ttl_hours;
        let default_ttl = TimeDelta::try_hours(hours)
            .filter(|_| (1..=MAX_CREDENTIAL_TTL_HOURS).contains(&hours))
            .ok_or_else(|| WardenError::ConfigError {
                reason: format!(
                    "identity.default_credential_ttl_hours must be between 1 and {}, got {}",
                    MAX_CREDENTIAL_TTL_HOURS, hours
                ),
            })?;
        maintenance::validate_sweep_interval(
            "identity.sweep_interval_secs",
            Duration::from_secs(config.sweep_interval_secs),
        )?;
        Ok(Self {
            config,
            default_ttl,
            agents: RwLock::new(HashMap::new()),
            by_value: RwLock::new(HashMap::new()),
            events,
        })
    }

    // ── Identities ───────────────────────────────────────────────────────────

    /// Register a new identity.
    ///
    /// Returns `DuplicateEntity` if the id is taken and `ConfigError` if a role
    /// is not in the role table.
    pub fn register_agent(&self, identity: AgentIdentity) -> WardenResult<AgentIdentity> {
        if let Some(role) = identity.roles.iter().find(|r| !roles::is_known_role(r)) {
            return Err(unknown_role(role));
        }
        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        if agents.contains_key(&identity.id) {
            return Err(WardenError::DuplicateEntity {
                entity: "agent".to_string(),
                id: identity.id,
            });
        }
        info!(agent_id = %identity.id, name = %identity.name, "agent registered");
        agents.insert(
            identity.id.clone(),
            Arc::new(RwLock::new(AgentRecord {
                identity: identity.clone(),
                credentials: HashMap::new(),
            })),
        );
        Ok(identity)
    }

    /// The current identity of `agent_id`.
    pub fn get_agent(&self, agent_id: &str) -> WardenResult<AgentIdentity> {
        let record = self.record(agent_id)?;
        let record = record.read().unwrap_or_else(PoisonError::into_inner);
        Ok(record.identity.clone())
    }

    /// Every identity, ordered by id.
    pub fn list_agents(&self) -> Vec<AgentIdentity> {
        let records: Vec<Shared<AgentRecord>> = self
            .agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut out: Vec<AgentIdentity> = records
            .iter()
            .map(|r| {
                r.read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .identity
                    .clone()
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Apply descriptive changes. Revoked identities are frozen.
    pub fn update_agent(&self, agent_id: &str, update: AgentUpdate) -> WardenResult<AgentIdentity> {
        self.modify(agent_id, |identity| {
            reject_revoked(identity, "updated")?;
            if let Some(name) = update.name {
                identity.name = name;
            }
            if let Some(description) = update.description {
                identity.description = description;
            }
            if let Some(owner) = update.owner {
                identity.owner = Some(owner);
            }
            if let Some(metadata) = update.metadata {
                identity.metadata = metadata;
            }
            Ok(())
        })
    }

    /// Active → suspended. Suspended agents hold no usable permissions or
    /// credentials until reactivated.
    pub fn suspend_agent(&self, agent_id: &str) -> WardenResult<AgentIdentity> {
        let identity = self.transition(agent_id, AgentStatus::Active, AgentStatus::Suspended)?;
        info!(agent_id = %agent_id, "agent suspended");
        Ok(identity)
    }

    /// Suspended → active.
    pub fn reactivate_agent(&self, agent_id: &str) -> WardenResult<AgentIdentity> {
        let identity = self.transition(agent_id, AgentStatus::Suspended, AgentStatus::Active)?;
        info!(agent_id = %agent_id, "agent reactivated");
        Ok(identity)
    }

    /// Revoke the identity and every credential it holds in one step.
    ///
    /// Returns the number of credentials revoked.
    pub fn revoke_agent(&self, agent_id: &str) -> WardenResult<usize> {
        let record = self.record(agent_id)?;
        let revoked: Vec<AgentCredential> = {
            let mut record = record.write().unwrap_or_else(PoisonError::into_inner);
            reject_revoked(&record.identity, "revoked")?;
            record.identity.status = AgentStatus::Revoked;
            record.identity.updated_at = Utc::now();
            record.credentials.drain().map(|(_, c)| c).collect()
        };
        self.unindex(revoked.iter().map(|c| c.value.as_str()));

        warn!(agent_id = %agent_id, credentials = revoked.len(), "agent revoked");
        self.events.publish(&GovernanceEvent::AgentRevoked {
            agent_id: agent_id.to_string(),
            credentials_revoked: revoked.len(),
        });
        Ok(revoked.len())
    }

    // ── Permissions and roles ────────────────────────────────────────────────

    /// Add a direct grant. The agent must not be revoked.
    pub fn grant_permission(
        &self,
        agent_id: &str,
        grant: PermissionGrant,
    ) -> WardenResult<AgentIdentity> {
        let resource = grant.resource.clone();
        let identity = self.modify(agent_id, |identity| {
            reject_revoked(identity, "granted")?;
            identity.permissions.push(grant);
            Ok(())
        })?;
        info!(agent_id = %agent_id, resource = %resource, "permission granted");
        Ok(identity)
    }

    /// Remove every direct grant on exactly `resource`. Returns how many
    /// were removed.
    pub fn revoke_permission(&self, agent_id: &str, resource: &str) -> WardenResult<usize> {
        let mut removed = 0;
        self.modify(agent_id, |identity| {
            let before = identity.permissions.len();
            identity.permissions.retain(|g| g.resource != resource);
            removed = before - identity.permissions.len();
            Ok(())
        })?;
        if removed > 0 {
            info!(agent_id = %agent_id, resource = %resource, removed, "permission revoked");
        }
        Ok(removed)
    }

    /// Add a role from the role table. Assigning a held role is a no-op.
    pub fn assign_role(&self, agent_id: &str, role: &str) -> WardenResult<AgentIdentity> {
        if !roles::is_known_role(role) {
            return Err(unknown_role(role));
        }
        self.modify(agent_id, |identity| {
            reject_revoked(identity, "role_assigned")?;
            if !identity.roles.iter().any(|r| r == role) {
                identity.roles.push(role.to_string());
            }
            Ok(())
        })
    }

    /// Drop a role if held.
    pub fn remove_role(&self, agent_id: &str, role: &str) -> WardenResult<AgentIdentity> {
        self.modify(agent_id, |identity| {
            identity.roles.retain(|r| r != role);
            Ok(())
        })
    }

    /// Direct grants first (expired ones skipped), then role permissions.
    ///
    /// Unknown, suspended and revoked agents have no permissions.
    pub fn has_permission(&self, agent_id: &str, resource: &str, action: &str) -> bool {
        self.has_permission_at(agent_id, resource, action, Utc::now())
    }

    /// `has_permission` evaluated at `now`, for grant expiry.
    pub fn has_permission_at(
        &self,
        agent_id: &str,
        resource: &str,
        action: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let Ok(record) = self.record(agent_id) else {
            return false;
        };
        let record = record.read().unwrap_or_else(PoisonError::into_inner);
        let identity = &record.identity;
        if identity.status != AgentStatus::Active {
            return false;
        }

        let direct = identity
            .permissions
            .iter()
            .filter(|g| !g.is_expired_at(now))
            .any(|g| roles::grant_permits(g, resource, action));
        if direct {
            return true;
        }
        if identity.roles.iter().any(|r| r == SYSTEM_ADMIN) {
            return true;
        }
        identity
            .roles
            .iter()
            .any(|r| roles::role_permits(r, resource, action))
    }

    // ── Credentials ──────────────────────────────────────────────────────────

    /// Issue a new credential. `ttl` defaults to the configured lifetime.
    ///
    /// Returns `WardenError::ConfigError` if `ttl` is not positive or longer
    /// than `MAX_CREDENTIAL_TTL_HOURS`.
    pub fn issue_credential(
        &self,
        agent_id: &str,
        credential_type: CredentialType,
        ttl: Option<chrono::Duration>,
        rotation_policy: Option<RotationPolicy>,
    ) -> WardenResult<AgentCredential> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let record = self.record(agent_id)?;
        let credential = {
            let mut record = record.write().unwrap_or_else(PoisonError::into_inner);
            require_active(&record.identity, "credential_issued")?;
            let credential =
                new_credential(agent_id, credential_type, ttl, rotation_policy, None)?;
            record
                .credentials
                .insert(credential.id.clone(), credential.clone());
            credential
        };
        self.index(&credential);
        info!(
            agent_id = %agent_id,
            credential_id = %credential.id,
            credential_type = ?credential_type,
            "credential issued"
        );
        Ok(credential)
    }

    /// Replace a credential with a fresh one of the same type, lifetime and
    /// rotation policy. The old credential stops working immediately.
    pub fn rotate_credential(
        &self,
        agent_id: &str,
        credential_id: &str,
    ) -> WardenResult<AgentCredential> {
        let record = self.record(agent_id)?;
        let (old, new) = {
            let mut record = record.write().unwrap_or_else(PoisonError::into_inner);
            require_active(&record.identity, "credential_rotated")?;
            let old = record.credentials.get(credential_id).cloned().ok_or_else(|| {
                WardenError::CredentialNotFound {
                    credential_id: credential_id.to_string(),
                }
            })?;
            let ttl = old
                .expires_at
                .map(|e| e.signed_duration_since(old.issued_at))
                .unwrap_or(self.default_ttl);
            let new = new_credential(
                agent_id,
                old.credential_type,
                ttl,
                old.rotation_policy.clone(),
                Some(old.id.clone()),
            )?;
            record.credentials.remove(credential_id);
            record.credentials.insert(new.id.clone(), new.clone());
            (old, new)
        };
        self.unindex(std::iter::once(old.value.as_str()));
        self.index(&new);

        info!(
            agent_id = %agent_id,
            old_credential_id = %old.id,
            new_credential_id = %new.id,
            "credential rotated"
        );
        self.events.publish(&GovernanceEvent::CredentialRotated {
            agent_id: agent_id.to_string(),
            old_credential_id: old.id,
            new_credential_id: new.id.clone(),
        });
        Ok(new)
    }

    /// Revoke one credential. It stops validating immediately.
    pub fn revoke_credential(&self, agent_id: &str, credential_id: &str) -> WardenResult<()> {
        let record = self.record(agent_id)?;
        let removed = record
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .credentials
            .remove(credential_id)
            .ok_or_else(|| WardenError::CredentialNotFound {
                credential_id: credential_id.to_string(),
            })?;
        self.unindex(std::iter::once(removed.value.as_str()));

        info!(agent_id = %agent_id, credential_id = %credential_id, "credential revoked");
        self.events.publish(&GovernanceEvent::CredentialRevoked {
            agent_id: agent_id.to_string(),
            credential_id: credential_id.to_string(),
        });
        Ok(())
    }

    /// Credentials currently held by `agent_id`, oldest first.
    pub fn list_credentials(&self, agent_id: &str) -> WardenResult<Vec<AgentCredential>> {
        let record = self.record(agent_id)?;
        let record = record.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<AgentCredential> = record.credentials.values().cloned().collect();
        out.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    /// The credential with this secret value, if it is unexpired and its
    /// owner is active.
    pub fn validate_credential(&self, value: &str) -> Option<AgentCredential> {
        self.validate_credential_at(value, Utc::now())
    }

    /// `validate_credential` evaluated at `now`.
    pub fn validate_credential_at(&self, value: &str, now: DateTime<Utc>) -> Option<AgentCredential> {
        let agent_id = self
            .by_value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(value)
            .cloned()?;
        let record = self.record(&agent_id).ok()?;
        let record = record.read().unwrap_or_else(PoisonError::into_inner);
        if record.identity.status != AgentStatus::Active {
            return None;
        }
        record
            .credentials
            .values()
            .find(|c| c.value == value && !c.is_expired_at(now))
            .cloned()
    }

    /// Remove expired credentials from every agent. Returns how many were removed.
    pub fn sweep_expired_credentials(&self) -> usize {
        self.sweep_expired_credentials_at(Utc::now())
    }

    /// Remove every credential expired at `now`. Returns how many.
    pub fn sweep_expired_credentials_at(&self, now: DateTime<Utc>) -> usize {
        let records: Vec<Shared<AgentRecord>> = self
            .agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut expired_values = Vec::new();
        for record in records {
            let mut record = record.write().unwrap_or_else(PoisonError::into_inner);
            let expired: Vec<String> = record
                .credentials
                .values()
                .filter(|c| c.is_expired_at(now))
                .map(|c| c.id.clone())
                .collect();
            for id in expired {
                if let Some(c) = record.credentials.remove(&id) {
                    expired_values.push(c.value);
                }
            }
        }
        self.unindex(expired_values.iter().map(String::as_str));

        if !expired_values.is_empty() {
            info!(removed = expired_values.len(), "expired credentials swept");
        }
        expired_values.len()
    }

    /// Run `sweep_expired_credentials` every `every` until the manager is dropped.
    pub fn spawn_credential_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = maintenance::sweep_ticker(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    debug!("identity manager dropped, stopping credential sweeper");
                    break;
                };
                manager.sweep_expired_credentials();
            }
        })
    }

    /// The configured sweep interval.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.config.sweep_interval_secs)
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn record(&self, agent_id: &str) -> WardenResult<Shared<AgentRecord>> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(agent_id)
            .cloned()
            .ok_or_else(|| WardenError::AgentNotFound {
                agent_id: agent_id.to_string(),
            })
    }

    fn modify<F>(&self, agent_id: &str, f: F) -> WardenResult<AgentIdentity>
    where
        F: FnOnce(&mut AgentIdentity) -> WardenResult<()>,
    {
        let record = self.record(agent_id)?;
        let mut record = record.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut record.identity)?;
        record.identity.updated_at = Utc::now();
        Ok(record.identity.clone())
    }

    fn transition(
        &self,
        agent_id: &str,
        from: AgentStatus,
        to: AgentStatus,
    ) -> WardenResult<AgentIdentity> {
        self.modify(agent_id, |identity| {
            if identity.status != from {
                return Err(WardenError::InvalidTransition {
                    entity: "agent".to_string(),
                    from: identity.status.to_string(),
                    to: to.to_string(),
                });
            }
            identity.status = to;
            Ok(())
        })
    }

    fn index(&self, credential: &AgentCredential) {
        self.by_value
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(credential.value.clone(), credential.agent_id.clone());
    }

    fn unindex<'a>(&self, values: impl Iterator<Item = &'a str>) {
        let mut index = self.by_value.write().unwrap_or_else(PoisonError::into_inner);
        for value in values {
            index.remove(value);
        }
    }
}

impl PermissionChecker for AgentIdentityManager {
    fn has_permission(&self, agent_id: &str, resource: &str, action: &str) -> bool {
        AgentIdentityManager::has_permission(self, agent_id, resource, action)
    }
}

fn unknown_role(role: &str) -> WardenError {
    WardenError::ConfigError {
        reason: format!(
            "unknown role '{}'; known roles: {}",
            role,
            roles::role_names().collect::<Vec<_>>().join(", ")
        ),
    }
}

fn reject_revoked(identity: &AgentIdentity, to: &str) -> WardenResult<()> {
    if identity.status == AgentStatus::Revoked {
        return Err(WardenError::InvalidTransition {
            entity: "agent".to_string(),
            from: AgentStatus::Revoked.to_string(),
            to: to.to_string(),
        });
    }
    Ok(())
}

fn require_active(identity: &AgentIdentity, to: &str) -> WardenResult<()> {
    if identity.status != AgentStatus::Active {
        return Err(WardenError::InvalidTransition {
            entity: "agent".to_string(),
            from: identity.status.to_string(),
            to: to.to_string(),
        });
    }
    Ok(())
}

/// `<prefix>_<64 hex chars>`.
fn generate_secret(credential_type: CredentialType) -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}_{}", credential_type.prefix(), hex::encode(bytes))
}

fn new_credential(
    agent_id: &str,
    credential_type: CredentialType,
    ttl: chrono::Duration,
    rotation_policy: Option<RotationPolicy>,
    rotated_from: Option<String>,
) -> WardenResult<AgentCredential> {
    let issued_at = Utc::now();
    let expires_at = Some(ttl)
        .filter(|ttl| *ttl > TimeDelta::zero() && ttl.num_hours() <= MAX_CREDENTIAL_TTL_HOURS)
        .and_then(|ttl| issued_at.checked_add_signed(ttl))
        .ok_or_else(|| WardenError::ConfigError {
            reason: format!(
                "credential ttl must be positive and at most {} hours, got {}",
                MAX_CREDENTIAL_TTL_HOURS, ttl
            ),
        })?;
    Ok(AgentCredential {
        id: uuid::Uuid::new_v4().to_string(),
        agent_id: agent_id.to_string(),
        credential_type,
        value: generate_secret(credential_type),
        issued_at,
        expires_at: Some(expires_at),
        rotation_policy,
        rotated_from,
    })
}
