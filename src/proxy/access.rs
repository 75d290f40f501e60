//! Access gate for crossing the tunnel boundary

use crate::proxy::types::{ProxyError, ProxyResult, TenantId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Role held by an authenticated caller
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Operator,
    InfraAdmin,
    User,
}

/// Authenticated caller, attached to each request by the auth middleware
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub roles: HashSet<Role>,
}

impl Principal {
    pub fn new(tenant_id: TenantId, user_id: UserId, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            tenant_id,
            user_id,
            roles: roles.into_iter().collect(),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Only operators and infra admins may reach a remote site
pub struct AccessGate;

impl AccessGate {
    pub fn authorize(principal: &Principal) -> ProxyResult<()> {
        if principal.has_role(Role::Operator) || principal.has_role(Role::InfraAdmin) {
            return Ok(());
        }

        let err = ProxyError::PermissionDenied {
            tenant_id: principal.tenant_id.clone(),
            user_id: principal.user_id.clone(),
        };
        warn!(
            tenant_id = %principal.tenant_id,
            user_id = %principal.user_id,
            "RBAC error: {err}"
        );
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn principal(roles: &[Role]) -> Principal {
        Principal::new(
            TenantId::try_new("tenant-1").unwrap(),
            UserId::try_new("user-1").unwrap(),
            roles.iter().copied(),
        )
    }

    #[rstest]
    #[case::operator(&[Role::Operator])]
    #[case::infra_admin(&[Role::InfraAdmin])]
    #[case::both(&[Role::User, Role::InfraAdmin])]
    fn test_privileged_roles_pass(#[case] roles: &[Role]) {
        assert!(AccessGate::authorize(&principal(roles)).is_ok());
    }

    #[rstest]
    #[case::plain_user(&[Role::User])]
    #[case::no_roles(&[])]
    fn test_other_callers_denied(#[case] roles: &[Role]) {
        match AccessGate::authorize(&principal(roles)) {
            Err(ProxyError::PermissionDenied { tenant_id, user_id }) => {
                assert_eq!(tenant_id.as_ref(), "tenant-1");
                assert_eq!(user_id.as_ref(), "user-1");
            }
            other => panic!("expected PermissionDenied, got {other:?}"),
        }
    }

    #[test]
    fn test_role_deserializes_from_snake_case() {
        let roles: Vec<Role> = serde_json::from_str(r#"["operator", "infra_admin", "user"]"#).unwrap();
        assert_eq!(roles, vec![Role::Operator, Role::InfraAdmin, Role::User]);
    }
}
