//! Authorization module - permission catalog, resolver and request gate
//!
//! This module implements the role/permission resolution engine:
//! - A static permission catalog with write-implies-view inference
//! - Role grants backed by a pluggable `RolePermissionStore`
//! - Direct per-user grants carried on the principal
//! - System role bypass and a config-gated development bypass
//! - Request-scoped preloading so checks avoid per-call store round trips
//!
//! Every evaluation is fail-closed: store errors are logged and count as
//! "not granted".

pub mod catalog;
mod config;
mod extract;
mod gate;
mod principal;
mod resolver;
mod store;
#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{permissions, Action, CatalogError, PermissionGroup, PermissionName};
pub use config::DevModeConfig;
pub use extract::{load_principal, CurrentPrincipal};
pub use gate::{default_operations, operations, AuthorizationGate, OperationTable, ACCESS_DENIED};
pub use principal::{assemble, AccessLevel, DirectGrant, Principal, RoleGrantCache};
pub use resolver::{Decision, DecisionRule, Evaluation, PermissionResolver, PolicyEvaluator};
pub use store::{InMemoryRolePermissionStore, RolePermissionStore, StoreError};
