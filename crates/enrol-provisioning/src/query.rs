//! Read-side reconciliation
//!
//! Listings prefer the directory. When it is absent or fails, accounts come
//! from deferred-import entries and groups from the local group-record store
//! followed by deferred group entries whose name was not already seen. These
//! calls never fail: the worst case is an empty list.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use enrol_core::{
    BackendFactory, DnLayout, EnrolError, EntryKind, GroupRecord, IdentityRecord, LdifEntry,
    RecordOrigin, RecordStore, Sourced,
};

/// Read-only view across directory and local store
pub struct Reconciler<S: RecordStore> {
    store: Arc<S>,
    factory: Arc<dyn BackendFactory>,
}

impl<S: RecordStore> Reconciler<S> {
    pub fn new(store: Arc<S>, factory: Arc<dyn BackendFactory>) -> Self {
        Self { store, factory }
    }

    #[instrument(skip(self))]
    pub async fn list_accounts(&self) -> Vec<Sourced<IdentityRecord>> {
        match self.factory.select().search_accounts().await {
            Ok(accounts) => return accounts,
            Err(e) => log_fallback("accounts", &e),
        }

        let layout = self.factory.layout();
        match self.store.read_deferred(EntryKind::Account).await {
            Ok(entries) => entries
                .iter()
                .filter_map(|entry| deferred_account(&layout, entry))
                .collect(),
            Err(e) => {
                warn!("Failed to read deferred account entries: {}", e);
                vec![]
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn list_groups(&self) -> Vec<Sourced<GroupRecord>> {
        match self.factory.select().search_groups().await {
            Ok(groups) => return groups,
            Err(e) => log_fallback("groups", &e),
        }

        let layout = self.factory.layout();
        let mut groups: Vec<Sourced<GroupRecord>> = match self.store.read_groups().await {
            Ok(local) => local
                .into_iter()
                .map(|g| Sourced::new(layout.group_dn(&g.name), RecordOrigin::LocalStore, g))
                .collect(),
            Err(e) => {
                warn!("Failed to read local group store: {}", e);
                vec![]
            }
        };

        let mut seen: HashSet<String> = groups.iter().map(|g| g.record.name.clone()).collect();

        match self.store.read_deferred(EntryKind::Group).await {
            Ok(entries) => {
                for entry in &entries {
                    let Some(group) = entry.to_group() else {
                        continue;
                    };
                    if !seen.insert(group.name.clone()) {
                        continue;
                    }
                    let dn = entry
                        .dn()
                        .map(str::to_string)
                        .unwrap_or_else(|| layout.group_dn(&group.name));
                    groups.push(Sourced::new(dn, RecordOrigin::Deferred, group));
                }
            }
            Err(e) => warn!("Failed to read deferred group entries: {}", e),
        }

        groups
    }
}

fn deferred_account(layout: &DnLayout, entry: &LdifEntry) -> Option<Sourced<IdentityRecord>> {
    let account = entry.to_account()?;
    let dn = entry
        .dn()
        .map(str::to_string)
        .unwrap_or_else(|| layout.account_dn(&account.login));
    Some(Sourced::new(dn, RecordOrigin::Deferred, account))
}

fn log_fallback(what: &str, e: &EnrolError) {
    match e {
        EnrolError::DirectoryUnavailable => debug!("Listing {} from local records", what),
        other => warn!("Directory {} query failed, falling back to local records: {}", what, other),
    }
}
