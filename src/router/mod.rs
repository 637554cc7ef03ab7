//! Static route tables, one per role family.
//!
//! Selection is a single exhaustive match on [`Role`]; anything that is not a
//! super admin or a seller gets the artisan table, the most restrictive one.

use crate::models::Role;
use crate::tenant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Path below `/:tenant/admin/`
    pub path: &'static str,
    pub title: &'static str,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RouteTable {
    pub name: &'static str,
    pub routes: &'static [Route],
}

impl RouteTable {
    /// First entry of every table.
    pub fn dashboard(&self) -> &'static Route {
        &self.routes[0]
    }

    /// Exact match, or a nested path below a table entry (`orders/42`).
    pub fn find(&self, rest: &str) -> Option<&'static Route> {
        let rest = rest.trim_matches('/');
        self.routes.iter().find(|route| {
            rest == route.path
                || rest
                    .strip_prefix(route.path)
                    .is_some_and(|tail| tail.starts_with('/'))
        })
    }

    pub fn contains(&self, rest: &str) -> bool {
        self.find(rest).is_some()
    }
}

pub static SUPER_ADMIN_ROUTES: RouteTable = RouteTable {
    name: "super_admin",
    routes: &[
        Route { path: "dashboard", title: "Dashboard" },
        Route { path: "catalog", title: "Catalog" },
        Route { path: "orders", title: "Orders" },
        Route { path: "customers", title: "Customers" },
        Route { path: "categories", title: "Categories" },
        Route { path: "settings", title: "Settings" },
    ],
};

pub static SELLER_ROUTES: RouteTable = RouteTable {
    name: "seller",
    routes: &[
        Route { path: "seller/dashboard", title: "Dashboard" },
        Route { path: "seller/catalog", title: "Catalog" },
        Route { path: "seller/orders", title: "Orders" },
        Route { path: "seller/customers", title: "Customers" },
    ],
};

pub static ARTISAN_ROUTES: RouteTable = RouteTable {
    name: "artisan",
    routes: &[Route { path: "artisan/dashboard", title: "Tasks" }],
};

pub struct RoleRouter;

impl RoleRouter {
    pub fn table(role: Role) -> &'static RouteTable {
        match role {
            Role::SuperAdmin => &SUPER_ADMIN_ROUTES,
            Role::Seller => &SELLER_ROUTES,
            Role::Artisan | Role::Viewer => &ARTISAN_ROUTES,
        }
    }

    /// Tenant-qualified default dashboard for `role`.
    pub fn dashboard_path(role: Role, tenant_id: Option<&str>) -> String {
        tenant::tenant_path(tenant_id, Self::table(role).dashboard().path)
    }

    /// Every role whose table serves `rest`. Empty for unknown paths.
    pub fn permitted_roles(rest: &str) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|role| Self::table(*role).contains(rest))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_per_role() {
        assert_eq!(RoleRouter::table(Role::SuperAdmin).routes.len(), 6);
        assert_eq!(RoleRouter::table(Role::Seller).name, "seller");
        assert_eq!(RoleRouter::table(Role::Artisan).name, "artisan");
    }

    #[test]
    fn test_unclassified_role_fails_closed() {
        assert_eq!(RoleRouter::table(Role::Viewer), &ARTISAN_ROUTES);
        assert_eq!(RoleRouter::table(Role::from("owner".to_string())), &ARTISAN_ROUTES);
    }

    #[test]
    fn test_dashboard_paths() {
        assert_eq!(
            RoleRouter::dashboard_path(Role::SuperAdmin, Some("acme")),
            "/acme/admin/dashboard"
        );
        assert_eq!(
            RoleRouter::dashboard_path(Role::Seller, Some("acme")),
            "/acme/admin/seller/dashboard"
        );
        assert_eq!(
            RoleRouter::dashboard_path(Role::Viewer, None),
            "/artisan/dashboard"
        );
    }

    #[test]
    fn test_nested_paths_match_their_entry() {
        let table = RoleRouter::table(Role::SuperAdmin);
        assert_eq!(table.find("orders/42").map(|r| r.path), Some("orders"));
        assert!(table.find("ordersx").is_none());
        assert!(table.find("seller/orders").is_none());
    }

    #[test]
    fn test_tables_are_disjoint() {
        assert_eq!(RoleRouter::permitted_roles("settings"), vec![Role::SuperAdmin]);
        assert_eq!(RoleRouter::permitted_roles("seller/catalog"), vec![Role::Seller]);
        assert_eq!(
            RoleRouter::permitted_roles("artisan/dashboard"),
            vec![Role::Artisan, Role::Viewer]
        );
        assert!(RoleRouter::permitted_roles("nowhere").is_empty());
    }
}
