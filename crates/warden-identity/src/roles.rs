//! The fixed role table and grant matching.
//!
//! Permission keys are `resource:action`; either half may be `*`.

use warden_contracts::identity::PermissionGrant;

/// Role key that permits everything.
pub const SYSTEM_ADMIN: &str = "system:admin";

const ROLES: &[(&str, &[&str])] = &[
    (SYSTEM_ADMIN, &["*"]),
    (
        "workflow:executor",
        &[
            "workflows:read",
            "workflows:execute",
            "executions:read",
            "executions:create",
        ],
    ),
    (
        "workflow:editor",
        &["workflows:read", "workflows:create", "workflows:update"],
    ),
    ("data:reader", &["data:read"]),
    ("data:writer", &["data:read", "data:write"]),
    (
        "agent:observer",
        &["workflows:read", "executions:read", "reports:read"],
    ),
    ("compliance:auditor", &["reports:*", "violations:read", "audit:read"]),
];

/// Whether `role` is in the role table.
pub fn is_known_role(role: &str) -> bool {
    ROLES.iter().any(|(name, _)| *name == role)
}

/// Every role name, in table order.
pub fn role_names() -> impl Iterator<Item = &'static str> {
    ROLES.iter().map(|(name, _)| *name)
}

/// Whether `role` carries a permission key matching `resource` and `action`.
pub fn role_permits(role: &str, resource: &str, action: &str) -> bool {
    let Some((_, keys)) = ROLES.iter().find(|(name, _)| *name == role) else {
        return false;
    };
    keys.iter().any(|key| key_permits(key, resource, action))
}

fn key_permits(key: &str, resource: &str, action: &str) -> bool {
    if key == "*" {
        return true;
    }
    let Some((key_resource, key_action)) = key.rsplit_once(':') else {
        return false;
    };
    resource_matches(key_resource, resource) && (key_action == "*" || key_action == action)
}

/// `*` matches everything; a trailing `*` is a prefix match.
pub fn resource_matches(pattern: &str, resource: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) => resource.starts_with(prefix),
        None => pattern == resource,
    }
}

/// Whether `grant` covers `action` on `resource`. Expiry is checked by
/// the caller.
pub fn grant_permits(grant: &PermissionGrant, resource: &str, action: &str) -> bool {
    resource_matches(&grant.resource, resource)
        && grant.actions.iter().any(|a| a == "*" || a == action)
}

#[cfg(test)]
mod tests {
    use warden_contracts::identity::PermissionScope;

    use super::*;

    #[test]
    fn admin_key_permits_everything() {
        assert!(role_permits(SYSTEM_ADMIN, "anything", "delete"));
    }

    #[test]
    fn role_keys_match_exact_and_wildcard_actions() {
        assert!(role_permits("data:reader", "data", "read"));
        assert!(!role_permits("data:reader", "data", "write"));
        assert!(role_permits("compliance:auditor", "reports", "export"));
        assert!(!role_permits("unknown:role", "data", "read"));
    }

    #[test]
    fn grants_support_prefix_resources() {
        let grant = PermissionGrant::new("workflows/*", ["read"], PermissionScope::Team);
        assert!(grant_permits(&grant, "workflows/billing", "read"));
        assert!(!grant_permits(&grant, "workflows/billing", "delete"));
        assert!(!grant_permits(&grant, "reports/q1", "read"));
    }
}
