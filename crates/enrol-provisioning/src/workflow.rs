//! Provisioning workflow
//!
//! An account is provisioned in this order:
//! 1. derive the login, allocate uid and gid
//! 2. stage the personal group in the local store and write its deferred entry
//! 3. add group then account to the directory, if one is configured
//! 4. on any directory failure, or without a directory, write the account's
//!    deferred entry
//!
//! Falling back is a normal outcome, reported as `via: fallback`.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use enrol_core::{
    validate_entry_name, AccountDefaults, AllocationSettings, BackendFactory, DirectoryBackend,
    EnrolError, EntryKind, GidNumber, GroupOutcome, GroupRecord, IdentityRecord, LdifEntry,
    NewAccount, ProvisionOutcome, ProvisionVia, RecordStore, Result,
};

use crate::allocator::IdAllocator;
use crate::credential::hash_password;
use crate::login::derive_login;

/// Creates accounts and groups against the directory with local fallback
pub struct Provisioner<S: RecordStore> {
    pub(crate) store: Arc<S>,
    pub(crate) factory: Arc<dyn BackendFactory>,
    allocator: IdAllocator<S>,
    defaults: AccountDefaults,
}

/// How the directory step of a provisioning attempt ended
enum DirectoryAttempt {
    Committed,
    Skipped,
    Failed(EnrolError),
}

impl<S: RecordStore> Provisioner<S> {
    pub fn new(
        store: Arc<S>,
        factory: Arc<dyn BackendFactory>,
        ranges: AllocationSettings,
        defaults: AccountDefaults,
    ) -> Self {
        Self {
            allocator: IdAllocator::new(ranges, store.clone()),
            store,
            factory,
            defaults,
        }
    }

    pub fn allocator(&self) -> &IdAllocator<S> {
        &self.allocator
    }

    /// Provision an account and its personal group
    #[instrument(skip(self, request), fields(first_name = %request.first_name, last_name = %request.last_name))]
    pub async fn provision(&self, request: &NewAccount) -> Result<ProvisionOutcome> {
        request.validate()?;
        let login = derive_login(&request.first_name, &request.last_name);
        if login.is_empty() {
            return Err(EnrolError::invalid_input(
                "first name yields an empty login after normalization",
            ));
        }

        let directory = self.factory.select();
        let layout = self.factory.layout();

        let uid_number = self.allocator.next_uid(directory.as_ref()).await?;
        let gid_number = self.allocator.next_gid(directory.as_ref()).await?;

        info!(
            login = %login,
            uid_number = %uid_number,
            gid_number = %gid_number,
            backend = directory.name(),
            "Provisioning account"
        );

        let group = GroupRecord::personal(&login, gid_number);
        let group_dn = layout.group_dn(&login);
        let group_file = self.stage_group(&group_dn, &group).await?;

        let account = IdentityRecord {
            login: login.clone(),
            display_name: format!("{} {}", request.first_name, request.last_name)
                .trim()
                .to_string(),
            surname: request.last_name.clone(),
            uid_number,
            gid_number,
            home_directory: self.defaults.home_directory(&login),
            login_shell: self.defaults.default_shell.clone(),
            mail: request.email.clone(),
            credential: Some(hash_password(request.password.as_bytes())),
        };
        let dn = layout.account_dn(&login);

        let attempt = match directory
            .add_account_with_group(&group_dn, &group, &dn, &account)
            .await
        {
            Ok(()) => DirectoryAttempt::Committed,
            Err(EnrolError::DirectoryUnavailable) => DirectoryAttempt::Skipped,
            Err(e) => DirectoryAttempt::Failed(e),
        };

        let (via, account_file, error_note) = match attempt {
            DirectoryAttempt::Committed => {
                info!(dn = %dn, "Account provisioned in directory");
                (ProvisionVia::Directory, None, None)
            }
            DirectoryAttempt::Skipped => {
                let file = self.defer_account(&dn, &account).await?;
                (ProvisionVia::Fallback, Some(file), None)
            }
            DirectoryAttempt::Failed(e) => {
                if e.is_recoverable() {
                    warn!(dn = %dn, "Directory provisioning failed, falling back: {}", e);
                } else {
                    error!(dn = %dn, "Directory provisioning misconfigured, falling back: {}", e);
                }
                let error_note = self.note(EntryKind::Account, &login, &e).await;
                let file = self.defer_account(&dn, &account).await?;
                (ProvisionVia::Fallback, Some(file), error_note)
            }
        };

        Ok(ProvisionOutcome {
            via,
            login,
            dn,
            group_dn,
            uid_number,
            gid_number,
            account_file,
            group_file,
            error_note,
            completed_at: Utc::now(),
        })
    }

    /// Create a standalone group. Fails with `Duplicate` when the local store
    /// already holds a group of that name; a directory-side duplicate only
    /// shows up as a failed directory add.
    #[instrument(skip(self))]
    pub async fn create_group(&self, name: &str, gid: Option<GidNumber>) -> Result<GroupOutcome> {
        let name = name.trim();
        validate_entry_name("group", name)?;

        let existing = self.store.read_groups().await?;
        if existing.iter().any(|g| g.name == name) {
            return Err(EnrolError::duplicate("group", name));
        }

        let directory = self.factory.select();
        let layout = self.factory.layout();

        let gid = match gid {
            Some(gid) => gid,
            None => self.allocator.next_gid(directory.as_ref()).await?,
        };

        let group = GroupRecord::new(name, gid);
        let dn = layout.group_dn(name);
        let group_file = self.stage_group(&dn, &group).await?;

        let (via, error_note) = match directory.add_group(&dn, &group).await {
            Ok(()) => {
                info!(dn = %dn, gid = %gid, "Group created in directory");
                (ProvisionVia::Directory, None)
            }
            Err(EnrolError::DirectoryUnavailable) => (ProvisionVia::Fallback, None),
            Err(e) => {
                if e.is_recoverable() {
                    warn!(dn = %dn, "Directory group add failed, keeping local copy: {}", e);
                } else {
                    error!(dn = %dn, "Directory group add misconfigured, keeping local copy: {}", e);
                }
                (ProvisionVia::Fallback, self.note(EntryKind::Group, name, &e).await)
            }
        };

        Ok(GroupOutcome {
            via,
            name: name.to_string(),
            dn,
            gid,
            group_file,
            error_note,
            completed_at: Utc::now(),
        })
    }

    /// Write the group's deferred entry, then merge it into the local store
    /// unless one of that name exists. A failed entry write leaves the store
    /// untouched.
    async fn stage_group(&self, dn: &str, group: &GroupRecord) -> Result<String> {
        let entry = LdifEntry::from_group(dn, group);
        let group_file = self
            .store
            .write_deferred(EntryKind::Group, &group.name, &entry)
            .await?;

        let existing = self.store.read_groups().await?;
        if existing.iter().any(|g| g.name == group.name) {
            debug!(group = %group.name, "Group already in local store, not re-adding");
        } else {
            self.store.append_group(group).await?;
        }
        Ok(group_file)
    }

    async fn defer_account(&self, dn: &str, account: &IdentityRecord) -> Result<String> {
        let entry = LdifEntry::from_account(dn, account);
        let file = self
            .store
            .write_deferred(EntryKind::Account, &account.login, &entry)
            .await?;
        info!(file = %file, "Account written as deferred-import entry");
        Ok(file)
    }

    /// Persist the raw directory error next to the deferred entry. A note
    /// that cannot be written is only logged.
    async fn note(&self, kind: EntryKind, name: &str, error: &EnrolError) -> Option<String> {
        match self
            .store
            .write_error_note(kind, name, &error.to_string())
            .await
        {
            Ok(location) => Some(location),
            Err(e) => {
                warn!("Failed to write error note for {}: {}", name, e);
                None
            }
        }
    }

    pub(crate) fn directory(&self) -> Arc<dyn DirectoryBackend> {
        self.factory.select()
    }
}
