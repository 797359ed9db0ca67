use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::catalog::{self, PermissionName};
use super::config::DevModeConfig;
use super::principal::Principal;
use super::store::RolePermissionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// The rule that produced a decision. Diagnostic only; never shown to callers
/// who were denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum DecisionRule {
    Unauthenticated,
    MalformedPermission,
    DevelopmentOverride,
    SystemRole,
    DirectGrant,
    RoleGrant { role: String },
    ImpliedGrant { role: String, via: String },
    NoMatchingGrant,
}

impl fmt::Display for DecisionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionRule::Unauthenticated => f.write_str("unauthenticated"),
            DecisionRule::MalformedPermission => f.write_str("malformed permission"),
            DecisionRule::DevelopmentOverride => f.write_str("development override"),
            DecisionRule::SystemRole => f.write_str("system role"),
            DecisionRule::DirectGrant => f.write_str("direct grant"),
            DecisionRule::RoleGrant { role } => write!(f, "granted to role {role}"),
            DecisionRule::ImpliedGrant { role, via } => {
                write!(f, "implied by {via} granted to role {role}")
            }
            DecisionRule::NoMatchingGrant => f.write_str("no matching grant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub decision: Decision,
    #[serde(flatten)]
    pub rule: DecisionRule,
}

impl Evaluation {
    fn allow(rule: DecisionRule) -> Self {
        Self {
            decision: Decision::Allow,
            rule,
        }
    }

    fn deny(rule: DecisionRule) -> Self {
        Self {
            decision: Decision::Deny,
            rule,
        }
    }
}

/// Policy evaluator trait for pluggable authorization logic
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Decide whether the principal holds `permission`. Total and fail-closed.
    async fn evaluate(&self, principal: &Principal, permission: &str) -> Decision;

    async fn can(&self, principal: &Principal, permission: &str) -> bool {
        self.evaluate(principal, permission).await.is_allowed()
    }
}

/// Role/permission resolver.
///
/// Evaluation order (first match wins):
/// 1. unauthenticated principal -> deny
/// 2. malformed permission (no `Category.Action` shape) -> deny
/// 3. development override (config gated, off by default) -> allow
/// 4. any held role is a system role -> allow
/// 5. direct grant with `ReadOnly`/`All` access -> allow
/// 6. any held role is granted the permission -> allow
/// 7. for a `View` permission, any held role granted the category's
///    `Edit`/`Delete`/`Approve` -> allow
/// 8. deny
///
/// Rules 3 and 4 are security-sensitive shortcuts: they allow without
/// looking at a single grant row.
///
/// Store failures are logged and treated as "no grant", so they can only
/// ever move the outcome towards deny.
#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn RolePermissionStore>,
    dev_mode: DevModeConfig,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn RolePermissionStore>) -> Self {
        Self {
            store,
            dev_mode: DevModeConfig::disabled(),
        }
    }

    pub fn with_dev_mode(mut self, dev_mode: DevModeConfig) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    pub fn store(&self) -> &dyn RolePermissionStore {
        self.store.as_ref()
    }

    pub fn dev_mode(&self) -> &DevModeConfig {
        &self.dev_mode
    }

    /// Evaluate and report which rule decided.
    pub async fn explain(&self, principal: &Principal, permission: &str) -> Evaluation {
        if !principal.authenticated {
            tracing::debug!(permission = %permission, "unauthenticated principal denied");
            return Evaluation::deny(DecisionRule::Unauthenticated);
        }

        let name = match PermissionName::parse(permission) {
            Ok(name) => name,
            Err(err) => {
                tracing::warn!(
                    user_id = ?principal.user_id,
                    error = %err,
                    "permission check with malformed permission denied"
                );
                return Evaluation::deny(DecisionRule::MalformedPermission);
            }
        };

        if let Some(identity) = principal.identity.as_deref() {
            if self.dev_mode.matches(identity) {
                tracing::info!(
                    user_id = ?principal.user_id,
                    identity = %identity,
                    permission = %permission,
                    "development override"
                );
                return Evaluation::allow(DecisionRule::DevelopmentOverride);
            }
        }

        if self.holds_system_role(principal).await {
            tracing::debug!(
                user_id = ?principal.user_id,
                permission = %permission,
                "system role bypass"
            );
            return Evaluation::allow(DecisionRule::SystemRole);
        }

        if principal.has_direct_access(permission) {
            tracing::debug!(
                user_id = ?principal.user_id,
                permission = %permission,
                "direct grant match"
            );
            return Evaluation::allow(DecisionRule::DirectGrant);
        }

        if let Some(role) = self.granting_role(principal, permission).await {
            tracing::debug!(
                user_id = ?principal.user_id,
                permission = %permission,
                role = %role,
                "role grant match"
            );
            return Evaluation::allow(DecisionRule::RoleGrant { role });
        }

        if name.is_view() {
            for implied in catalog::implying(permission) {
                if let Some(role) = self.granting_role(principal, &implied).await {
                    tracing::debug!(
                        user_id = ?principal.user_id,
                        permission = %permission,
                        via = %implied,
                        role = %role,
                        "implied grant match"
                    );
                    return Evaluation::allow(DecisionRule::ImpliedGrant { role, via: implied });
                }
            }
        }

        tracing::debug!(
            user_id = ?principal.user_id,
            permission = %permission,
            "permission denied"
        );
        Evaluation::deny(DecisionRule::NoMatchingGrant)
    }

    /// Every catalogued permission the principal currently holds, with the deciding rule.
    pub async fn effective_permissions(&self, principal: &Principal) -> Vec<(&'static str, DecisionRule)> {
        let mut held = Vec::new();
        for permission in catalog::all_permissions() {
            let evaluation = self.explain(principal, permission).await;
            if evaluation.decision.is_allowed() {
                held.push((permission, evaluation.rule));
            }
        }
        held
    }

    async fn holds_system_role(&self, principal: &Principal) -> bool {
        if let Some(flag) = principal.system_role {
            return flag;
        }

        for role in &principal.roles {
            match self.store.is_system_role(role).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(
                        user_id = ?principal.user_id,
                        role = %role,
                        error = %err,
                        "system role lookup failed, treating role as non-system"
                    );
                }
            }
        }
        false
    }

    /// First held role granted `permission`, preferring the request cache.
    async fn granting_role(&self, principal: &Principal, permission: &str) -> Option<String> {
        for role in &principal.roles {
            let granted = match principal.role_grants.lookup(role, permission) {
                Some(granted) => granted,
                None => match self.store.check_granted(role, permission).await {
                    Ok(granted) => granted,
                    Err(err) => {
                        tracing::error!(
                            user_id = ?principal.user_id,
                            role = %role,
                            permission = %permission,
                            error = %err,
                            "grant lookup failed, treating as not granted"
                        );
                        false
                    }
                },
            };
            if granted {
                return Some(role.clone());
            }
        }
        None
    }
}

#[async_trait]
impl PolicyEvaluator for PermissionResolver {
    async fn evaluate(&self, principal: &Principal, permission: &str) -> Decision {
        self.explain(principal, permission).await.decision
    }
}
