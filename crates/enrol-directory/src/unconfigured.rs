//! Backend used when no directory service is configured

use async_trait::async_trait;

use enrol_core::{
    AccountChanges, DirectoryBackend, EnrolError, GroupRecord, IdentityRecord, Result, Sourced,
};

/// Refuses every operation with [`EnrolError::DirectoryUnavailable`], which
/// callers treat as "use the local record store".
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

#[async_trait]
impl DirectoryBackend for Unconfigured {
    fn name(&self) -> &'static str {
        "unconfigured"
    }

    fn is_live(&self) -> bool {
        false
    }

    async fn search_accounts(&self) -> Result<Vec<Sourced<IdentityRecord>>> {
        Err(EnrolError::DirectoryUnavailable)
    }

    async fn search_groups(&self) -> Result<Vec<Sourced<GroupRecord>>> {
        Err(EnrolError::DirectoryUnavailable)
    }

    async fn add_group(&self, _dn: &str, _group: &GroupRecord) -> Result<()> {
        Err(EnrolError::DirectoryUnavailable)
    }

    async fn add_account_with_group(
        &self,
        _group_dn: &str,
        _group: &GroupRecord,
        _account_dn: &str,
        _account: &IdentityRecord,
    ) -> Result<()> {
        Err(EnrolError::DirectoryUnavailable)
    }

    async fn modify_account(&self, _dn: &str, _changes: &AccountChanges) -> Result<()> {
        Err(EnrolError::DirectoryUnavailable)
    }

    async fn delete_entry(&self, _dn: &str) -> Result<()> {
        Err(EnrolError::DirectoryUnavailable)
    }
}
