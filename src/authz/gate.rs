use std::collections::HashMap;
use std::sync::Arc;

use super::catalog::{self, permissions::*};
use super::principal::Principal;
use super::resolver::{Decision, PolicyEvaluator};
use crate::errors::{AppError, AppResult};

/// Message returned for every denied request. Never varies with the reason.
pub const ACCESS_DENIED: &str = "access denied";

/// Operation identifiers for the routes this service exposes.
pub mod operations {
    pub const PROJECTS_LIST: &str = "projects.list";
    pub const PROJECTS_GET: &str = "projects.get";
    pub const PROJECTS_CREATE: &str = "projects.create";
    pub const PROJECTS_UPDATE: &str = "projects.update";
    pub const PROJECTS_DELETE: &str = "projects.delete";

    pub const RBAC_CATALOG: &str = "rbac.catalog";
    pub const RBAC_ROLES_LIST: &str = "rbac.roles.list";
    pub const RBAC_ROLES_CREATE: &str = "rbac.roles.create";
    pub const RBAC_ROLES_DELETE: &str = "rbac.roles.delete";
    pub const RBAC_GRANTS_LIST: &str = "rbac.grants.list";
    pub const RBAC_GRANTS_SET: &str = "rbac.grants.set";
    pub const RBAC_GRANTS_REVOKE: &str = "rbac.grants.revoke";

    pub const USERS_ROLES_LIST: &str = "users.roles.list";
    pub const USERS_ROLES_ASSIGN: &str = "users.roles.assign";
    pub const USERS_ROLES_UNASSIGN: &str = "users.roles.unassign";
    pub const USERS_GRANTS_LIST: &str = "users.grants.list";
    pub const USERS_GRANTS_SET: &str = "users.grants.set";
    pub const USERS_EFFECTIVE: &str = "users.effective_permissions";
}

/// Declarative mapping from operation id to the permission it requires.
#[derive(Debug, Clone)]
pub struct OperationTable {
    entries: HashMap<&'static str, &'static str>,
}

impl OperationTable {
    /// Every permission must be catalogued and every operation listed once.
    pub fn new(entries: &[(&'static str, &'static str)]) -> AppResult<Self> {
        let mut map = HashMap::with_capacity(entries.len());
        for (operation, permission) in entries {
            let permission = catalog::canonical(permission).ok_or_else(|| {
                AppError::configuration(format!(
                    "operation {operation} requires unknown permission {permission}"
                ))
            })?;
            if map.insert(*operation, permission).is_some() {
                return Err(AppError::configuration(format!("operation {operation} declared twice")));
            }
        }
        Ok(Self { entries: map })
    }

    pub fn required_permission(&self, operation: &str) -> Option<&'static str> {
        self.entries.get(operation).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The table for this service's routes.
pub fn default_operations() -> AppResult<OperationTable> {
    use operations as op;

    OperationTable::new(&[
        (op::PROJECTS_LIST, PROJECTS_VIEW),
        (op::PROJECTS_GET, PROJECTS_VIEW),
        (op::PROJECTS_CREATE, PROJECTS_EDIT),
        (op::PROJECTS_UPDATE, PROJECTS_EDIT),
        (op::PROJECTS_DELETE, PROJECTS_DELETE),
        (op::RBAC_CATALOG, ROLES_VIEW),
        (op::RBAC_ROLES_LIST, ROLES_VIEW),
        (op::RBAC_ROLES_CREATE, ROLES_EDIT),
        (op::RBAC_ROLES_DELETE, ROLES_DELETE),
        (op::RBAC_GRANTS_LIST, ROLES_VIEW),
        (op::RBAC_GRANTS_SET, ROLES_EDIT),
        (op::RBAC_GRANTS_REVOKE, ROLES_EDIT),
        (op::USERS_ROLES_LIST, USERS_VIEW),
        (op::USERS_ROLES_ASSIGN, USERS_EDIT),
        (op::USERS_ROLES_UNASSIGN, USERS_EDIT),
        (op::USERS_GRANTS_LIST, USERS_VIEW),
        (op::USERS_GRANTS_SET, USERS_EDIT),
        (op::USERS_EFFECTIVE, USERS_VIEW),
    ])
}

/// Turns resolver decisions into request rejections.
///
/// Unauthenticated callers get 401, everyone else who is denied gets 403
/// with the same fixed message whatever the underlying reason.
#[derive(Clone)]
pub struct AuthorizationGate {
    evaluator: Arc<dyn PolicyEvaluator>,
    operations: Arc<OperationTable>,
}

impl AuthorizationGate {
    pub fn new(evaluator: Arc<dyn PolicyEvaluator>, operations: OperationTable) -> Self {
        Self {
            evaluator,
            operations: Arc::new(operations),
        }
    }

    pub async fn authorize(&self, principal: &Principal, operation: &str) -> AppResult<()> {
        let Some(permission) = self.operations.required_permission(operation) else {
            tracing::warn!(operation = %operation, "operation has no declared permission, denying");
            return Err(self.reject(principal));
        };
        self.require(principal, permission).await
    }

    pub async fn require(&self, principal: &Principal, permission: &str) -> AppResult<()> {
        match self.evaluator.evaluate(principal, permission).await {
            Decision::Allow => Ok(()),
            Decision::Deny => Err(self.reject(principal)),
        }
    }

    fn reject(&self, principal: &Principal) -> AppError {
        if principal.authenticated {
            AppError::forbidden(ACCESS_DENIED)
        } else {
            AppError::unauthorized("authentication required")
        }
    }
}
