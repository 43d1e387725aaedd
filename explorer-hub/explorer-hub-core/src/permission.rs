//! Document permission checks.
//!
//! The explorer only depends on the [`PermissionGate`] contract. [`AclStore`]
//! is the bundled implementation: explicit per-document grants for each
//! principal, copied from the parent folder when a document is created.
//! Grants are held against the full `type:uuid` key, so documents of two
//! types that happen to share a uuid never share grants.

use crate::node::NodeKey;
use crate::storage::write_json_atomic;
use crate::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

pub const USE: &str = "Use";
pub const READ: &str = "Read";
pub const UPDATE: &str = "Update";
pub const DELETE: &str = "Delete";
/// Implies every other permission on the document.
pub const OWNER: &str = "Owner";

const CREATE_PREFIX: &str = "Create - ";

/// Permission needed on a folder to create or copy a document of `doc_type`
/// into it.
pub fn create_permission(doc_type: &str) -> String {
    format!("{}{}", CREATE_PREFIX, doc_type)
}

/// Permission checks made on behalf of one caller.
pub trait PermissionGate: Send + Sync {
    fn has_permission(&self, doc_type: &str, uuid: &str, permission: &str) -> bool;

    /// Set up the grants of a freshly created document.
    fn create_initial_permissions(
        &self,
        doc_type: &str,
        uuid: &str,
        parent_folder: Option<&NodeKey>,
    );
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct AclData {
    #[serde(default)]
    administrators: BTreeSet<String>,
    /// `type:uuid` -> principal -> permissions
    #[serde(default)]
    grants: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

#[derive(Default)]
pub struct AclStore {
    data: RwLock<AclData>,
}

impl AclStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_administrators<I, S>(administrators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        store
            .data
            .write()
            .administrators
            .extend(administrators.into_iter().map(Into::into));
        store
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = std::fs::read_to_string(path)?;
        Ok(Self {
            data: RwLock::new(serde_json::from_str(&data)?),
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = self.data.read().clone();
        write_json_atomic(path.as_ref(), &data)
    }

    pub fn add_administrator(&self, principal: impl Into<String>) {
        self.data.write().administrators.insert(principal.into());
    }

    pub fn is_administrator(&self, principal: &str) -> bool {
        self.data.read().administrators.contains(principal)
    }

    pub fn grant(&self, doc: &NodeKey, principal: &str, permission: &str) {
        self.data
            .write()
            .grants
            .entry(doc.to_string())
            .or_default()
            .entry(principal.to_string())
            .or_default()
            .insert(permission.to_string());
    }

    pub fn revoke(&self, doc: &NodeKey, principal: &str, permission: &str) {
        let doc = doc.to_string();
        let mut data = self.data.write();
        if let Some(principals) = data.grants.get_mut(&doc) {
            if let Some(perms) = principals.get_mut(principal) {
                perms.remove(permission);
                if perms.is_empty() {
                    principals.remove(principal);
                }
            }
            if principals.is_empty() {
                data.grants.remove(&doc);
            }
        }
    }

    /// Forget every grant on a deleted document.
    pub fn clear(&self, doc: &NodeKey) {
        self.data.write().grants.remove(&doc.to_string());
    }

    pub fn permissions(&self, doc: &NodeKey, principal: &str) -> BTreeSet<String> {
        self.data
            .read()
            .grants
            .get(&doc.to_string())
            .and_then(|p| p.get(principal))
            .cloned()
            .unwrap_or_default()
    }

    pub fn check(&self, principal: &str, doc: &NodeKey, permission: &str) -> bool {
        let data = self.data.read();
        if data.administrators.contains(principal) {
            return true;
        }
        data.grants
            .get(&doc.to_string())
            .and_then(|p| p.get(principal))
            .map_or(false, |perms| perms.contains(permission) || perms.contains(OWNER))
    }

    /// Give `to` every grant currently held on `from`.
    pub fn copy_grants(&self, from: &NodeKey, to: &NodeKey) {
        let mut data = self.data.write();
        let Some(source) = data.grants.get(&from.to_string()).cloned() else {
            return;
        };
        let target = data.grants.entry(to.to_string()).or_default();
        for (principal, perms) in source {
            target.entry(principal).or_default().extend(perms);
        }
    }
}

/// [`PermissionGate`] for a single user backed by a shared [`AclStore`].
#[derive(Clone)]
pub struct UserPermissions {
    acl: Arc<AclStore>,
    user: String,
}

impl UserPermissions {
    pub fn new(acl: Arc<AclStore>, user: impl Into<String>) -> Self {
        Self {
            acl,
            user: user.into(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

impl PermissionGate for UserPermissions {
    fn has_permission(&self, doc_type: &str, uuid: &str, permission: &str) -> bool {
        self.acl
            .check(&self.user, &NodeKey::new(doc_type, uuid), permission)
    }

    fn create_initial_permissions(
        &self,
        doc_type: &str,
        uuid: &str,
        parent_folder: Option<&NodeKey>,
    ) {
        let doc = NodeKey::new(doc_type, uuid);
        if let Some(parent) = parent_folder {
            self.acl.copy_grants(parent, &doc);
        }
        self.acl.grant(&doc, &self.user, OWNER);
    }
}
