//! Which seller and which artisan are "in view" for the current operator.
//!
//! Mutability depends on the role: artisans see a fixed pair, sellers pick
//! among their own artisans, super admins pick both. Disallowed changes are
//! silent no-ops; the controls that trigger them are never offered to those
//! roles.

use crate::models::{Artisan, Role, Seller, User};
use crate::storage::{BrowserStorage, SELECTED_ARTISAN_KEY, SELECTED_SELLER_KEY};

#[derive(Debug)]
pub struct HierarchyScope {
    storage: BrowserStorage,
    role: Option<Role>,
    current_seller_id: Option<String>,
    current_artisan_id: Option<String>,
    sellers: Vec<Seller>,
    artisans: Vec<Artisan>,
}

fn non_empty(id: Option<&str>) -> Option<&str> {
    id.map(str::trim).filter(|id| !id.is_empty())
}

impl HierarchyScope {
    pub fn new(storage: BrowserStorage) -> Self {
        Self {
            storage,
            role: None,
            current_seller_id: None,
            current_artisan_id: None,
            sellers: Vec::new(),
            artisans: Vec::new(),
        }
    }

    /// Seed the scope for a freshly authenticated user. Intrinsic ids win
    /// over anything in storage.
    pub fn initialize(&mut self, user: &User, sellers: Vec<Seller>, artisans: Vec<Artisan>) {
        self.role = Some(user.role);
        self.sellers = sellers;
        self.artisans = artisans;

        match user.role {
            Role::SuperAdmin => {
                let stored = self.storage.durable().get(SELECTED_SELLER_KEY);
                self.current_seller_id = match stored {
                    Some(id) if self.sellers.is_empty() || self.has_seller(&id) => Some(id),
                    _ => self.sellers.first().map(|s| s.id.clone()),
                };
                self.current_artisan_id = self.stored_artisan();
            }
            Role::Seller => {
                self.current_seller_id = user.seller_id.clone();
                self.current_artisan_id = self.stored_artisan();
            }
            Role::Artisan | Role::Viewer => {
                self.current_seller_id = user.seller_id.clone();
                self.current_artisan_id = user.artisan_id.clone();
            }
        }

        tracing::debug!(
            role = %user.role,
            seller_id = ?self.current_seller_id,
            artisan_id = ?self.current_artisan_id,
            "Hierarchy scope initialized"
        );
    }

    /// A stored artisan selection, honoured only when it belongs to the
    /// seller in view.
    fn stored_artisan(&self) -> Option<String> {
        let id = self.storage.durable().get(SELECTED_ARTISAN_KEY)?;
        self.belongs_to_current_seller(&id).then_some(id)
    }

    /// Forget the in-memory scope. Storage is cleared by the session teardown.
    pub fn reset(&mut self) {
        self.role = None;
        self.current_seller_id = None;
        self.current_artisan_id = None;
        self.sellers.clear();
        self.artisans.clear();
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn current_seller_id(&self) -> Option<&str> {
        self.current_seller_id.as_deref()
    }

    pub fn current_artisan_id(&self) -> Option<&str> {
        self.current_artisan_id.as_deref()
    }

    pub fn can_select_seller(&self) -> bool {
        self.role.is_some_and(|r| r.can_select_seller())
    }

    pub fn can_select_artisan(&self) -> bool {
        self.role.is_some_and(|r| r.can_select_artisan())
    }

    pub fn available_sellers(&self) -> Vec<&Seller> {
        match self.role {
            Some(Role::SuperAdmin) => self.sellers.iter().collect(),
            Some(Role::Seller | Role::Artisan | Role::Viewer) | None => self
                .sellers
                .iter()
                .filter(|s| Some(s.id.as_str()) == self.current_seller_id())
                .collect(),
        }
    }

    /// Artisans of the seller in view; empty when no seller is scoped.
    pub fn available_artisans(&self) -> Vec<&Artisan> {
        let Some(seller_id) = self.current_seller_id() else {
            return Vec::new();
        };
        self.artisans
            .iter()
            .filter(|a| a.seller_id == seller_id)
            .collect()
    }

    fn has_seller(&self, id: &str) -> bool {
        self.sellers.iter().any(|s| s.id == id)
    }

    fn belongs_to_current_seller(&self, artisan_id: &str) -> bool {
        self.available_artisans().iter().any(|a| a.id == artisan_id)
    }

    /// Super admins only. Any change drops the artisan selection; `None`
    /// un-scopes to the platform-wide view.
    pub fn set_seller_id(&mut self, id: Option<&str>) {
        if !self.can_select_seller() {
            tracing::debug!(role = ?self.role, "Ignoring seller change");
            return;
        }

        let durable = self.storage.durable();
        self.current_artisan_id = None;
        durable.remove(SELECTED_ARTISAN_KEY);

        match non_empty(id) {
            Some(id) => {
                durable.set(SELECTED_SELLER_KEY, id);
                self.current_seller_id = Some(id.to_string());
            }
            None => {
                self.storage.remove_everywhere(SELECTED_SELLER_KEY);
                self.current_seller_id = None;
            }
        }
        tracing::info!(seller_id = ?self.current_seller_id, "Seller scope changed");
    }

    /// Super admins and sellers, and only among the artisans of the seller
    /// in view.
    pub fn set_artisan_id(&mut self, id: Option<&str>) {
        if !self.can_select_artisan() {
            tracing::debug!(role = ?self.role, "Ignoring artisan change");
            return;
        }

        match non_empty(id) {
            Some(id) => {
                if !self.belongs_to_current_seller(id) {
                    tracing::debug!(artisan_id = %id, "Artisan outside the seller in view");
                    return;
                }
                self.storage.durable().set(SELECTED_ARTISAN_KEY, id);
                self.current_artisan_id = Some(id.to_string());
            }
            None => {
                self.storage.remove_everywhere(SELECTED_ARTISAN_KEY);
                self.current_artisan_id = None;
            }
        }
        tracing::info!(artisan_id = ?self.current_artisan_id, "Artisan scope changed");
    }
}
