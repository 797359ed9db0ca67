use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

/// Failure talking to the role/permission backing store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("role permission store unavailable: {0}")]
    Unavailable(String),
}

/// Read-side contract the resolver needs from role/permission persistence.
///
/// Implementations must ignore soft-deleted roles and grant rows, compare
/// role and permission names ASCII case-insensitively, and be safe to call
/// concurrently.
#[async_trait]
pub trait RolePermissionStore: Send + Sync {
    /// True iff an active grant row for `(role, permission)` has `is_granted = true`.
    async fn check_granted(&self, role: &str, permission: &str) -> Result<bool, StoreError>;

    /// Every permission the role is actively granted, lowercased.
    async fn granted_permissions(&self, role: &str) -> Result<HashSet<String>, StoreError>;

    async fn is_system_role(&self, role: &str) -> Result<bool, StoreError>;
}

#[derive(Debug, Clone)]
struct MemoryRole {
    name: String,
    is_system_role: bool,
    deleted: bool,
}

#[derive(Debug, Clone)]
struct MemoryGrant {
    role: String,
    permission: String,
    is_granted: bool,
    deleted: bool,
}

/// Thread-safe in-memory store.
///
/// Mirrors the SQLite semantics: soft-deleted rows are invisible, duplicate
/// rows are allowed and any active granted row wins. Every trait call bumps
/// a query counter, and [`fail`](Self::fail) makes every call return
/// [`StoreError::Unavailable`].
#[derive(Debug, Default)]
pub struct InMemoryRolePermissionStore {
    roles: RwLock<Vec<MemoryRole>>,
    grants: RwLock<Vec<MemoryGrant>>,
    queries: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryRolePermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(self, name: &str) -> Self {
        self.add_role(name, false);
        self
    }

    pub fn with_system_role(self, name: &str) -> Self {
        self.add_role(name, true);
        self
    }

    pub fn with_grant(self, role: &str, permission: &str) -> Self {
        self.add_grant(role, permission, true);
        self
    }

    pub fn with_revocation(self, role: &str, permission: &str) -> Self {
        self.add_grant(role, permission, false);
        self
    }

    pub fn add_role(&self, name: &str, is_system_role: bool) {
        if let Ok(mut roles) = self.roles.write() {
            roles.push(MemoryRole {
                name: name.to_string(),
                is_system_role,
                deleted: false,
            });
        }
    }

    /// Adds a grant row. Roles named here need not be registered with `add_role`.
    pub fn add_grant(&self, role: &str, permission: &str, is_granted: bool) {
        if let Ok(mut grants) = self.grants.write() {
            grants.push(MemoryGrant {
                role: role.to_string(),
                permission: permission.to_string(),
                is_granted,
                deleted: false,
            });
        }
    }

    /// Soft-deletes the role and every grant row that references it.
    pub fn delete_role(&self, name: &str) {
        if let Ok(mut roles) = self.roles.write() {
            roles
                .iter_mut()
                .filter(|r| r.name.eq_ignore_ascii_case(name))
                .for_each(|r| r.deleted = true);
        }
        if let Ok(mut grants) = self.grants.write() {
            grants
                .iter_mut()
                .filter(|g| g.role.eq_ignore_ascii_case(name))
                .for_each(|g| g.deleted = true);
        }
    }

    /// Soft-deletes every row for the `(role, permission)` pair.
    pub fn delete_grant(&self, role: &str, permission: &str) {
        if let Ok(mut grants) = self.grants.write() {
            grants
                .iter_mut()
                .filter(|g| g.role.eq_ignore_ascii_case(role) && g.permission.eq_ignore_ascii_case(permission))
                .for_each(|g| g.deleted = true);
        }
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn begin_query(&self) -> Result<(), StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store set to fail".to_string()));
        }
        Ok(())
    }

    fn role_is_deleted(&self, role: &str) -> Result<bool, StoreError> {
        let roles = self
            .roles
            .read()
            .map_err(|e| StoreError::Unavailable(format!("roles lock poisoned: {e}")))?;
        let mut matching = roles.iter().filter(|r| r.name.eq_ignore_ascii_case(role)).peekable();
        Ok(matching.peek().is_some() && matching.all(|r| r.deleted))
    }

    fn active_grants<F>(&self, role: &str, mut keep: F) -> Result<Vec<MemoryGrant>, StoreError>
    where
        F: FnMut(&MemoryGrant) -> bool,
    {
        if self.role_is_deleted(role)? {
            return Ok(Vec::new());
        }
        let grants = self
            .grants
            .read()
            .map_err(|e| StoreError::Unavailable(format!("grants lock poisoned: {e}")))?;
        Ok(grants
            .iter()
            .filter(|g| !g.deleted && g.role.eq_ignore_ascii_case(role) && keep(g))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RolePermissionStore for InMemoryRolePermissionStore {
    async fn check_granted(&self, role: &str, permission: &str) -> Result<bool, StoreError> {
        self.begin_query()?;
        let rows = self.active_grants(role, |g| g.permission.eq_ignore_ascii_case(permission))?;
        Ok(rows.iter().any(|g| g.is_granted))
    }

    async fn granted_permissions(&self, role: &str) -> Result<HashSet<String>, StoreError> {
        self.begin_query()?;
        let rows = self.active_grants(role, |g| g.is_granted)?;
        Ok(rows.into_iter().map(|g| g.permission.to_ascii_lowercase()).collect())
    }

    async fn is_system_role(&self, role: &str) -> Result<bool, StoreError> {
        self.begin_query()?;
        let roles = self
            .roles
            .read()
            .map_err(|e| StoreError::Unavailable(format!("roles lock poisoned: {e}")))?;
        Ok(roles
            .iter()
            .any(|r| !r.deleted && r.is_system_role && r.name.eq_ignore_ascii_case(role)))
    }
}
