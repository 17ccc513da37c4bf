use std::collections::{HashMap, HashSet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::types::ids::OperatorId;

/// Privileges checked at the admin call boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Add, remove and toggle price sources.
    OracleAdmin,
    /// Change breaker thresholds and toggle enforcement.
    BreakerAdmin,
    /// Reset a tripped breaker before its cooldown ends.
    Emergency,
}

#[cfg_attr(test, mockall::automock)]
pub trait Authorizer: Send + Sync {
    fn authorize(&self, caller: &OperatorId, role: Role) -> Result<()>;
}

/// In-memory operator/role table.
#[derive(Default)]
pub struct RoleRegistry {
    grants: RwLock<HashMap<OperatorId, HashSet<Role>>>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry where `operator` holds every role.
    pub fn with_admin(operator: OperatorId) -> Self {
        let registry = Self::new();
        for role in [Role::OracleAdmin, Role::BreakerAdmin, Role::Emergency] {
            registry.grant(operator, role);
        }
        registry
    }

    pub fn grant(&self, operator: OperatorId, role: Role) {
        self.grants.write().entry(operator).or_default().insert(role);
        tracing::info!(%operator, ?role, "Granted role");
    }

    pub fn revoke(&self, operator: OperatorId, role: Role) {
        if let Some(roles) = self.grants.write().get_mut(&operator) {
            roles.remove(&role);
            tracing::info!(%operator, ?role, "Revoked role");
        }
    }

    pub fn has_role(&self, operator: &OperatorId, role: Role) -> bool {
        self.grants
            .read()
            .get(operator)
            .is_some_and(|roles| roles.contains(&role))
    }
}

impl Authorizer for RoleRegistry {
    fn authorize(&self, caller: &OperatorId, role: Role) -> Result<()> {
        if self.has_role(caller, role) {
            Ok(())
        } else {
            tracing::warn!(operator = %caller, ?role, "Unauthorized admin call");
            Err(Error::Unauthorized { operator: *caller, role })
        }
    }
}

/// For hosts that authorise upstream of this crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _caller: &OperatorId, _role: Role) -> Result<()> {
        Ok(())
    }
}
