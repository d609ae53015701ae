//! Resource keys

use std::fmt;

use bytes::Bytes;
use tessera_primitives::Address;

/// A piece of state a transaction reads or writes.
///
/// Every key belongs to an owning account; conflicts are tracked at the
/// granularity of that owner. An empty path names the account itself.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    owner: Address,
    path: Bytes,
}

impl ResourceKey {
    /// Key for the account as a whole
    pub fn account(owner: Address) -> Self {
        Self {
            owner,
            path: Bytes::new(),
        }
    }

    /// Key for a named slot under `owner`
    pub fn path(owner: Address, path: impl Into<Bytes>) -> Self {
        Self {
            owner,
            path: path.into(),
        }
    }

    /// Owning account
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Slot path, empty for the account key
    pub fn slot(&self) -> &Bytes {
        &self.path
    }
}

impl fmt::Debug for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceKey({})", self)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.owner)
        } else {
            write!(f, "{}/{}", self.owner, String::from_utf8_lossy(&self.path))
        }
    }
}
