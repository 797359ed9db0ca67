//! Permission catalog
//!
//! The closed set of permission identifiers this service knows about, in the
//! canonical `"<Category>.<Action>"` form. The catalog is an explicit
//! registration table; nothing here touches the database.
//!
//! Comparisons are ASCII case-insensitive throughout.

use std::fmt;

/// Separator between category and action.
pub const SEPARATOR: char = '.';

/// The closed set of actions a permission may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    View,
    Edit,
    Delete,
    Approve,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::View, Action::Edit, Action::Delete, Action::Approve];

    /// Actions that imply `View` in the same category.
    pub const WRITE: [Action; 3] = [Action::Edit, Action::Delete, Action::Approve];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "View",
            Action::Edit => "Edit",
            Action::Delete => "Delete",
            Action::Approve => "Approve",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(raw))
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, Action::View)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("malformed permission: {0:?}")]
    Malformed(String),
    #[error("unknown permission: {0}")]
    Unknown(String),
}

/// A permission string split into its category and action parts.
///
/// The action text is kept verbatim; it does not have to be one of the
/// catalogued [`Action`]s for the name to be well formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionName<'a> {
    pub category: &'a str,
    pub action: &'a str,
}

impl<'a> PermissionName<'a> {
    /// Split `raw` at the first separator. Both halves must be non-empty.
    pub fn parse(raw: &'a str) -> Result<Self, CatalogError> {
        let (category, action) = raw
            .split_once(SEPARATOR)
            .ok_or_else(|| CatalogError::Malformed(raw.to_string()))?;

        if category.trim().is_empty() || action.trim().is_empty() {
            return Err(CatalogError::Malformed(raw.to_string()));
        }

        Ok(Self { category, action })
    }

    pub fn known_action(&self) -> Option<Action> {
        Action::parse(self.action)
    }

    pub fn is_view(&self) -> bool {
        self.known_action() == Some(Action::View)
    }
}

impl fmt::Display for PermissionName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.category, SEPARATOR, self.action)
    }
}

/// Well-known permission names
pub mod permissions {
    // Projects
    pub const PROJECTS_VIEW: &str = "Projects.View";
    pub const PROJECTS_EDIT: &str = "Projects.Edit";
    pub const PROJECTS_DELETE: &str = "Projects.Delete";

    // Estimates
    pub const ESTIMATES_VIEW: &str = "Estimates.View";
    pub const ESTIMATES_EDIT: &str = "Estimates.Edit";
    pub const ESTIMATES_DELETE: &str = "Estimates.Delete";
    pub const ESTIMATES_APPROVE: &str = "Estimates.Approve";

    // Customers
    pub const CUSTOMERS_VIEW: &str = "Customers.View";
    pub const CUSTOMERS_EDIT: &str = "Customers.Edit";
    pub const CUSTOMERS_DELETE: &str = "Customers.Delete";

    // Vendors
    pub const VENDORS_VIEW: &str = "Vendors.View";
    pub const VENDORS_EDIT: &str = "Vendors.Edit";
    pub const VENDORS_DELETE: &str = "Vendors.Delete";

    // Materials
    pub const MATERIALS_VIEW: &str = "Materials.View";
    pub const MATERIALS_EDIT: &str = "Materials.Edit";
    pub const MATERIALS_DELETE: &str = "Materials.Delete";

    // Bids
    pub const BIDS_VIEW: &str = "Bids.View";
    pub const BIDS_EDIT: &str = "Bids.Edit";
    pub const BIDS_DELETE: &str = "Bids.Delete";
    pub const BIDS_APPROVE: &str = "Bids.Approve";

    // Change orders
    pub const CHANGE_ORDERS_VIEW: &str = "ChangeOrders.View";
    pub const CHANGE_ORDERS_EDIT: &str = "ChangeOrders.Edit";
    pub const CHANGE_ORDERS_DELETE: &str = "ChangeOrders.Delete";
    pub const CHANGE_ORDERS_APPROVE: &str = "ChangeOrders.Approve";

    // Invoices
    pub const INVOICES_VIEW: &str = "Invoices.View";
    pub const INVOICES_EDIT: &str = "Invoices.Edit";
    pub const INVOICES_DELETE: &str = "Invoices.Delete";
    pub const INVOICES_APPROVE: &str = "Invoices.Approve";

    // Reports
    pub const REPORTS_VIEW: &str = "Reports.View";

    // Users
    pub const USERS_VIEW: &str = "Users.View";
    pub const USERS_EDIT: &str = "Users.Edit";
    pub const USERS_DELETE: &str = "Users.Delete";

    // Roles
    pub const ROLES_VIEW: &str = "Roles.View";
    pub const ROLES_EDIT: &str = "Roles.Edit";
    pub const ROLES_DELETE: &str = "Roles.Delete";
}

/// One feature area of the catalog and the actions it supports.
#[derive(Debug, Clone, Copy)]
pub struct PermissionGroup {
    pub category: &'static str,
    pub description: &'static str,
    pub permissions: &'static [&'static str],
}

use permissions::*;

static GROUPS: &[PermissionGroup] = &[
    PermissionGroup {
        category: "Projects",
        description: "Construction projects",
        permissions: &[PROJECTS_VIEW, PROJECTS_EDIT, PROJECTS_DELETE],
    },
    PermissionGroup {
        category: "Estimates",
        description: "Cost estimates and their line items",
        permissions: &[ESTIMATES_VIEW, ESTIMATES_EDIT, ESTIMATES_DELETE, ESTIMATES_APPROVE],
    },
    PermissionGroup {
        category: "Customers",
        description: "Customer records",
        permissions: &[CUSTOMERS_VIEW, CUSTOMERS_EDIT, CUSTOMERS_DELETE],
    },
    PermissionGroup {
        category: "Vendors",
        description: "Vendors and subcontractors",
        permissions: &[VENDORS_VIEW, VENDORS_EDIT, VENDORS_DELETE],
    },
    PermissionGroup {
        category: "Materials",
        description: "Material price lists",
        permissions: &[MATERIALS_VIEW, MATERIALS_EDIT, MATERIALS_DELETE],
    },
    PermissionGroup {
        category: "Bids",
        description: "Outgoing bids",
        permissions: &[BIDS_VIEW, BIDS_EDIT, BIDS_DELETE, BIDS_APPROVE],
    },
    PermissionGroup {
        category: "ChangeOrders",
        description: "Contract change orders",
        permissions: &[
            CHANGE_ORDERS_VIEW,
            CHANGE_ORDERS_EDIT,
            CHANGE_ORDERS_DELETE,
            CHANGE_ORDERS_APPROVE,
        ],
    },
    PermissionGroup {
        category: "Invoices",
        description: "Customer invoices",
        permissions: &[INVOICES_VIEW, INVOICES_EDIT, INVOICES_DELETE, INVOICES_APPROVE],
    },
    PermissionGroup {
        category: "Reports",
        description: "Read-only reporting",
        permissions: &[REPORTS_VIEW],
    },
    PermissionGroup {
        category: "Users",
        description: "User accounts, role assignment and direct grants",
        permissions: &[USERS_VIEW, USERS_EDIT, USERS_DELETE],
    },
    PermissionGroup {
        category: "Roles",
        description: "Roles and role permission grants",
        permissions: &[ROLES_VIEW, ROLES_EDIT, ROLES_DELETE],
    },
];

/// Catalog groups in registration order.
pub fn groups() -> &'static [PermissionGroup] {
    GROUPS
}

/// Every catalogued permission in registration order.
pub fn all_permissions() -> impl Iterator<Item = &'static str> {
    GROUPS.iter().flat_map(|group| group.permissions.iter().copied())
}

/// The catalog's spelling of `permission`, if it is catalogued.
pub fn canonical(permission: &str) -> Option<&'static str> {
    all_permissions().find(|known| known.eq_ignore_ascii_case(permission))
}

pub fn is_known(permission: &str) -> bool {
    canonical(permission).is_some()
}

/// Like [`canonical`] but with an error suitable for admin input validation.
pub fn require_known(permission: &str) -> Result<&'static str, CatalogError> {
    PermissionName::parse(permission)?;
    canonical(permission).ok_or_else(|| CatalogError::Unknown(permission.to_string()))
}

/// Substring before the first separator; `None` when the permission is malformed.
pub fn category_of(permission: &str) -> Option<&str> {
    PermissionName::parse(permission).ok().map(|name| name.category)
}

/// The `View` permission implied by a write permission (`Edit`, `Delete`, `Approve`).
pub fn implied_by(permission: &str) -> Option<String> {
    let name = PermissionName::parse(permission).ok()?;
    match name.known_action() {
        Some(action) if action.is_write() => Some(format!(
            "{}{}{}",
            name.category,
            SEPARATOR,
            Action::View
        )),
        _ => None,
    }
}

/// The write permissions that each imply `permission`. Empty unless it is a `View`.
pub fn implying(permission: &str) -> Vec<String> {
    match PermissionName::parse(permission) {
        Ok(name) if name.is_view() => Action::WRITE
            .iter()
            .map(|action| format!("{}{}{}", name.category, SEPARATOR, action))
            .collect(),
        _ => Vec::new(),
    }
}
