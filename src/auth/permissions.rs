use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewCatalog,

    ManageCatalog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    Customer,
    Admin,
}

static CUSTOMER_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewCatalog);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(CUSTOMER_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ManageCatalog);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Customer => &CUSTOMER_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Customer
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "admin" => Ok(Role::Admin),
            _ => Err(AppError::Validation(format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_admin_manages_catalog() {
        assert!(Role::Admin.has_permission(Permission::ManageCatalog));
        assert!(!Role::Customer.has_permission(Permission::ManageCatalog));
        assert!(Role::Customer.has_permission(Permission::ViewCatalog));
    }

    #[test]
    fn role_parsing_is_exact() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("customer".parse::<Role>().unwrap(), Role::Customer);
        assert!("Admin".parse::<Role>().is_err());
        assert!("mod".parse::<Role>().is_err());
    }
}
