use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tranche_core::AccountId;

use super::{Directory, DirectoryKey};

/// A directory backed by a fixed map, replaced wholesale by its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticDirectory {
    pub id: AccountId,
    pub entries: BTreeMap<DirectoryKey, AccountId>,
}

impl StaticDirectory {
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            entries: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: DirectoryKey, account: AccountId) -> Self {
        self.entries.insert(key, account);
        self
    }

    pub fn set(&mut self, key: DirectoryKey, account: AccountId) {
        self.entries.insert(key, account);
    }
}

impl Directory for StaticDirectory {
    fn id(&self) -> AccountId {
        self.id
    }

    fn resolve(&self, key: DirectoryKey) -> Option<AccountId> {
        self.entries.get(&key).copied()
    }
}
