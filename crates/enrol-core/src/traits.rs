//! Backend seams for the provisioning services

use async_trait::async_trait;
use std::sync::Arc;

use crate::{error::Result, ldif::*, models::*};

// =============================================================================
// Directory Backend
// =============================================================================

/// Capability to read and write the directory service.
///
/// Every call opens its own connection, binds, performs its operations and
/// releases the connection before returning, on success and failure alike.
/// Nothing is retried.
#[async_trait]
pub trait DirectoryBackend: Send + Sync {
    /// Short name for logs ("live", "unconfigured", ...)
    fn name(&self) -> &'static str;

    /// Whether this backend talks to a real directory
    fn is_live(&self) -> bool;

    /// All posixAccount entries under the people branch
    async fn search_accounts(&self) -> Result<Vec<Sourced<IdentityRecord>>>;

    /// All posixGroup entries under the groups branch
    async fn search_groups(&self) -> Result<Vec<Sourced<GroupRecord>>>;

    /// Add a group entry
    async fn add_group(&self, dn: &str, group: &GroupRecord) -> Result<()>;

    /// Add a group then an account on a single connection. If the group add
    /// fails the account add is never attempted.
    async fn add_account_with_group(
        &self,
        group_dn: &str,
        group: &GroupRecord,
        account_dn: &str,
        account: &IdentityRecord,
    ) -> Result<()>;

    /// Replace the given attributes of an account
    async fn modify_account(&self, dn: &str, changes: &AccountChanges) -> Result<()>;

    /// Delete an entry
    async fn delete_entry(&self, dn: &str) -> Result<()>;
}

/// Picks the directory backend for one operation
pub trait BackendFactory: Send + Sync {
    fn select(&self) -> Arc<dyn DirectoryBackend>;

    fn layout(&self) -> DnLayout;
}

// =============================================================================
// Local Record Store
// =============================================================================

/// Durable local mirror of groups and landing zone for deferred entries
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every group record, in stored order
    async fn read_groups(&self) -> Result<Vec<GroupRecord>>;

    /// Append a group record
    async fn append_group(&self, group: &GroupRecord) -> Result<()>;

    /// Overwrite the whole group-record set
    async fn replace_groups(&self, groups: &[GroupRecord]) -> Result<()>;

    /// Every deferred-import entry of the given kind
    async fn read_deferred(&self, kind: EntryKind) -> Result<Vec<LdifEntry>>;

    /// Write a deferred-import entry named after `name`, returning its location
    async fn write_deferred(&self, kind: EntryKind, name: &str, entry: &LdifEntry)
        -> Result<String>;

    /// Write an advisory error note next to a deferred entry, returning its location
    async fn write_error_note(&self, kind: EntryKind, name: &str, text: &str) -> Result<String>;
}
