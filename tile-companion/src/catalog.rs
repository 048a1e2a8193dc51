use std::collections::HashMap;

use crate::events::{AccountId, RecordBaseInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverySource {
    RecordList,
    SharedPointer,
}

#[derive(Debug, Clone)]
pub struct MatchMetadata {
    pub info: RecordBaseInfo,
    pub source: DiscoverySource,
    resolved_account: Option<AccountId>,
}

impl MatchMetadata {
    pub fn resolved_account(&self) -> Option<AccountId> {
        self.resolved_account
    }
}

#[derive(Debug, Default)]
pub struct MatchCatalog {
    records: HashMap<String, MatchMetadata>,
}

impl MatchCatalog {
    // First sighting wins; later sightings of the same uuid are ignored.
    pub fn upsert(&mut self, info: RecordBaseInfo, source: DiscoverySource) -> &MatchMetadata {
        self.records
            .entry(info.uuid.clone())
            .or_insert_with(|| MatchMetadata {
                info,
                source,
                resolved_account: None,
            })
    }

    pub fn get(&self, identity: &str) -> Option<&MatchMetadata> {
        self.records.get(identity)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.records.contains_key(identity)
    }

    pub fn resolve_account(&mut self, identity: &str, account: AccountId) -> bool {
        match self.records.get_mut(identity) {
            Some(entry) if entry.resolved_account != Some(account) => {
                entry.resolved_account = Some(account);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
