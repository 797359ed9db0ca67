use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::store::RolePermissionStore;

/// Access level carried by a direct (per-user) grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    None,
    ReadOnly,
    All,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::None => "none",
            AccessLevel::ReadOnly => "read_only",
            AccessLevel::All => "all",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "none" => Some(AccessLevel::None),
            "read_only" | "readonly" => Some(AccessLevel::ReadOnly),
            "all" => Some(AccessLevel::All),
            _ => None,
        }
    }

    /// Whether a direct grant at this level satisfies a check.
    pub fn allows(&self) -> bool {
        matches!(self, AccessLevel::ReadOnly | AccessLevel::All)
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectGrant {
    pub permission: String,
    pub access_level: AccessLevel,
}

impl DirectGrant {
    pub fn new(permission: impl Into<String>, access_level: AccessLevel) -> Self {
        Self {
            permission: permission.into(),
            access_level,
        }
    }
}

/// Granted permissions per held role, loaded once at the start of a request.
///
/// Keys and values are lowercased. A role missing from the cache was not
/// preloaded (or its preload failed) and must be looked up in the store.
#[derive(Debug, Clone, Default)]
pub struct RoleGrantCache {
    by_role: HashMap<String, HashSet<String>>,
}

impl RoleGrantCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, role: &str, permissions: impl IntoIterator<Item = String>) {
        let entry = self.by_role.entry(role.to_ascii_lowercase()).or_default();
        entry.extend(permissions.into_iter().map(|p| p.to_ascii_lowercase()));
    }

    /// `Some(granted)` if the role was preloaded, `None` otherwise.
    pub fn lookup(&self, role: &str, permission: &str) -> Option<bool> {
        self.by_role
            .get(&role.to_ascii_lowercase())
            .map(|granted| granted.contains(&permission.to_ascii_lowercase()))
    }

    pub fn contains_role(&self, role: &str) -> bool {
        self.by_role.contains_key(&role.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.by_role.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_role.is_empty()
    }
}

/// Principal represents the caller of the current request.
///
/// Built once per request by the authentication boundary and read-only
/// afterwards. `system_role` and `role_grants` are request-scoped caches;
/// when they are unset the resolver asks the store instead.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Option<Uuid>,
    /// Login identity (email), matched against the development domain suffix.
    pub identity: Option<String>,
    pub authenticated: bool,
    pub roles: Vec<String>,
    pub direct_grants: Vec<DirectGrant>,
    pub system_role: Option<bool>,
    pub role_grants: RoleGrantCache,
}

impl Principal {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            identity: None,
            authenticated: true,
            roles: Vec::new(),
            direct_grants: Vec::new(),
            system_role: None,
            role_grants: RoleGrantCache::new(),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            identity: None,
            authenticated: false,
            roles: Vec::new(),
            direct_grants: Vec::new(),
            system_role: None,
            role_grants: RoleGrantCache::new(),
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Role names are de-duplicated case-insensitively, keeping the first spelling.
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        self.roles = roles
            .into_iter()
            .map(Into::into)
            .filter(|role: &String| seen.insert(role.to_ascii_lowercase()))
            .collect();
        self
    }

    pub fn with_direct_grants(mut self, grants: impl IntoIterator<Item = DirectGrant>) -> Self {
        self.direct_grants = grants.into_iter().collect();
        self
    }

    pub fn with_system_role(mut self, system_role: bool) -> Self {
        self.system_role = Some(system_role);
        self
    }

    pub fn with_role_grants(mut self, cache: RoleGrantCache) -> Self {
        self.role_grants = cache;
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    /// Whether any direct grant for `permission` carries an allowing access level.
    pub fn has_direct_access(&self, permission: &str) -> bool {
        self.direct_grants
            .iter()
            .any(|g| g.permission.eq_ignore_ascii_case(permission) && g.access_level.allows())
    }

    /// Resolve the system-role flag and role grants for every held role up front.
    ///
    /// Costs two store calls per role. A failed call is logged and leaves the
    /// corresponding cache entry unset so the resolver falls back to the store.
    pub async fn preload(mut self, store: &dyn RolePermissionStore) -> Self {
        if !self.authenticated {
            return self;
        }

        let mut unresolved = false;
        let mut system_role = false;
        for role in &self.roles {
            match store.is_system_role(role).await {
                Ok(true) => {
                    system_role = true;
                    break;
                }
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(
                        user_id = ?self.user_id,
                        role = %role,
                        error = %err,
                        "failed to preload system role flag"
                    );
                    unresolved = true;
                }
            }
        }

        if system_role {
            self.system_role = Some(true);
            return self;
        }
        self.system_role = if unresolved { None } else { Some(false) };

        let mut cache = RoleGrantCache::new();
        for role in &self.roles {
            match store.granted_permissions(role).await {
                Ok(granted) => cache.insert(role, granted),
                Err(err) => {
                    tracing::error!(
                        user_id = ?self.user_id,
                        role = %role,
                        error = %err,
                        "failed to preload role grants"
                    );
                }
            }
        }
        self.role_grants = cache;
        self
    }
}

/// Build a principal for an authenticated user and preload its role data.
pub async fn assemble(
    store: &dyn RolePermissionStore,
    user_id: Uuid,
    identity: Option<String>,
    roles: Vec<String>,
    direct_grants: Vec<DirectGrant>,
) -> Principal {
    let mut principal = Principal::new(user_id)
        .with_roles(roles)
        .with_direct_grants(direct_grants);
    principal.identity = identity;
    principal.preload(store).await
}
