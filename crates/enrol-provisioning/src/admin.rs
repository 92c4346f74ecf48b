//! Maintenance operations on existing accounts and groups

use tracing::{info, instrument};

use enrol_core::{validate_entry_name, AccountChanges, EnrolError, RecordStore, Result};

use crate::workflow::Provisioner;

impl<S: RecordStore> Provisioner<S> {
    /// Replace mail, login shell or display name of a directory account.
    /// Requires a configured directory.
    #[instrument(skip(self, changes))]
    pub async fn update_account(&self, login: &str, changes: &AccountChanges) -> Result<String> {
        validate_entry_name("account", login)?;
        changes.validate()?;
        let directory = self.directory();
        if !directory.is_live() {
            return Err(EnrolError::config_error(
                "Directory not configured - cannot update account",
            ));
        }

        let dn = self.factory.layout().account_dn(login);
        if changes.is_empty() {
            return Ok(dn);
        }

        directory.modify_account(&dn, changes).await?;
        info!(dn = %dn, "Account updated");
        Ok(dn)
    }

    /// Delete a directory account. Requires a configured directory.
    #[instrument(skip(self))]
    pub async fn delete_account(&self, login: &str) -> Result<String> {
        validate_entry_name("account", login)?;
        let directory = self.directory();
        if !directory.is_live() {
            return Err(EnrolError::config_error(
                "Directory not configured - cannot delete account",
            ));
        }

        let dn = self.factory.layout().account_dn(login);
        directory.delete_entry(&dn).await?;
        info!(dn = %dn, "Account deleted");
        Ok(dn)
    }

    /// Remove a group from the local group-record store. Deferred entries are
    /// left untouched.
    #[instrument(skip(self))]
    pub async fn delete_group(&self, name: &str) -> Result<()> {
        let groups = self.store.read_groups().await?;
        let remaining: Vec<_> = groups.iter().filter(|g| g.name != name).cloned().collect();

        if remaining.len() == groups.len() {
            return Err(EnrolError::not_found("group", name));
        }

        self.store.replace_groups(&remaining).await?;
        info!(group = %name, "Group removed from local store");
        Ok(())
    }
}
