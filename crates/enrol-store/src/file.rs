//! File-backed record store
//!
//! Layout under the data directory:
//! - `groups.json`: JSON array of group records
//! - `ldif/<login>.ldif`: deferred account entries
//! - `ldif/group_<name>.ldif`: deferred group entries
//! - `ldif/<name>.error.txt`: advisory error notes
//!
//! A single writer is assumed; nothing here locks.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument, warn};

use enrol_core::{EnrolError, EntryKind, GroupRecord, LdifEntry, RecordStore, Result, StoreSettings};

const GROUP_PREFIX: &str = "group_";
const LDIF_SUFFIX: &str = ".ldif";
const NOTE_SUFFIX: &str = ".error.txt";

/// [`RecordStore`] over plain files
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    groups_file: PathBuf,
    ldif_dir: PathBuf,
}

impl FileRecordStore {
    pub fn new(settings: &StoreSettings) -> Self {
        Self {
            groups_file: settings.groups_file(),
            ldif_dir: settings.ldif_dir(),
        }
    }

    pub fn open(data_dir: impl Into<PathBuf>) -> Self {
        Self::new(&StoreSettings {
            data_dir: data_dir.into(),
        })
    }

    pub fn groups_file(&self) -> &Path {
        &self.groups_file
    }

    pub fn ldif_dir(&self) -> &Path {
        &self.ldif_dir
    }

    fn entry_file_name(kind: EntryKind, name: &str) -> String {
        match kind {
            EntryKind::Account => format!("{}{}", name, LDIF_SUFFIX),
            EntryKind::Group => format!("{}{}{}", GROUP_PREFIX, name, LDIF_SUFFIX),
        }
    }

    fn note_file_name(kind: EntryKind, name: &str) -> String {
        match kind {
            EntryKind::Account => format!("{}{}", name, NOTE_SUFFIX),
            EntryKind::Group => format!("{}{}{}", GROUP_PREFIX, name, NOTE_SUFFIX),
        }
    }

    fn is_kind(kind: EntryKind, file_name: &str) -> bool {
        if !file_name.ends_with(LDIF_SUFFIX) {
            return false;
        }
        match kind {
            EntryKind::Account => !file_name.starts_with(GROUP_PREFIX),
            EntryKind::Group => file_name.starts_with(GROUP_PREFIX),
        }
    }

    async fn ensure_ldif_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.ldif_dir)
            .await
            .map_err(|e| io_error("create", &self.ldif_dir, e))
    }

    async fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        self.ensure_ldif_dir().await?;
        fs::write(path, contents)
            .await
            .map_err(|e| io_error("write", path, e))
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    #[instrument(skip(self))]
    async fn read_groups(&self) -> Result<Vec<GroupRecord>> {
        let raw = match fs::read_to_string(&self.groups_file).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(io_error("read", &self.groups_file, e)),
        };

        if raw.trim().is_empty() {
            return Ok(vec![]);
        }

        serde_json::from_str(&raw).map_err(|e| {
            EnrolError::store_error(format!(
                "{} is not a valid group list: {}",
                self.groups_file.display(),
                e
            ))
        })
    }

    #[instrument(skip(self, group), fields(group = %group.name))]
    async fn append_group(&self, group: &GroupRecord) -> Result<()> {
        let mut groups = self.read_groups().await?;
        groups.push(group.clone());
        self.replace_groups(&groups).await
    }

    #[instrument(skip(self, groups), fields(count = groups.len()))]
    async fn replace_groups(&self, groups: &[GroupRecord]) -> Result<()> {
        if let Some(parent) = self.groups_file.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create", parent, e))?;
        }

        let json = serde_json::to_string_pretty(groups)
            .map_err(|e| EnrolError::store_error(format!("Failed to encode groups: {}", e)))?;

        fs::write(&self.groups_file, json)
            .await
            .map_err(|e| io_error("write", &self.groups_file, e))?;

        debug!("Group-record store rewritten");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn read_deferred(&self, kind: EntryKind) -> Result<Vec<LdifEntry>> {
        let mut dir = match fs::read_dir(&self.ldif_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(io_error("list", &self.ldif_dir, e)),
        };

        let mut names = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| io_error("list", &self.ldif_dir, e))?
        {
            if let Some(name) = item.file_name().to_str() {
                if Self::is_kind(kind, name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();

        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let path = self.ldif_dir.join(&name);
            match fs::read_to_string(&path).await {
                Ok(text) => entries.push(LdifEntry::parse(&text)),
                Err(e) => warn!(path = %path.display(), "Skipping unreadable deferred entry: {}", e),
            }
        }
        Ok(entries)
    }

    #[instrument(skip(self, entry))]
    async fn write_deferred(
        &self,
        kind: EntryKind,
        name: &str,
        entry: &LdifEntry,
    ) -> Result<String> {
        let path = self.ldif_dir.join(Self::entry_file_name(kind, name));
        self.write_file(&path, &entry.to_string()).await?;
        debug!(path = %path.display(), "Deferred-import entry written");
        Ok(path.display().to_string())
    }

    #[instrument(skip(self, text))]
    async fn write_error_note(&self, kind: EntryKind, name: &str, text: &str) -> Result<String> {
        let path = self.ldif_dir.join(Self::note_file_name(kind, name));
        self.write_file(&path, text).await?;
        Ok(path.display().to_string())
    }
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> EnrolError {
    EnrolError::store_error(format!("Failed to {} {}: {}", action, path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use enrol_core::GidNumber;

    fn store() -> (tempfile::TempDir, FileRecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRecordStore::open(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_missing_files_read_as_empty() {
        let (_dir, store) = store();
        assert!(store.read_groups().await.unwrap().is_empty());
        assert!(store.read_deferred(EntryKind::Account).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_and_replace_groups() {
        let (_dir, store) = store();
        store
            .append_group(&GroupRecord::personal("jeand", GidNumber::new(3000)))
            .await
            .unwrap();
        store
            .append_group(&GroupRecord::new("devs", GidNumber::new(3001)))
            .await
            .unwrap();

        let groups = store.read_groups().await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members, vec!["jeand".to_string()]);

        store.replace_groups(&groups[1..]).await.unwrap();
        let groups = store.read_groups().await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "devs");
    }

    #[tokio::test]
    async fn test_groups_file_uses_documented_keys() {
        let (_dir, store) = store();
        store
            .append_group(&GroupRecord::personal("jeand", GidNumber::new(3000)))
            .await
            .unwrap();
        let raw = std::fs::read_to_string(store.groups_file()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["name"], "jeand");
        assert_eq!(value[0]["gid"], 3000);
        assert_eq!(value[0]["members"][0], "jeand");
    }

    #[tokio::test]
    async fn test_corrupt_groups_file_is_an_error() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.groups_file().parent().unwrap()).unwrap();
        std::fs::write(store.groups_file(), "{not json").unwrap();
        assert!(matches!(
            store.read_groups().await,
            Err(EnrolError::StoreError { .. })
        ));
    }

    #[tokio::test]
    async fn test_deferred_entries_are_split_by_kind() {
        let (_dir, store) = store();

        let mut account = LdifEntry::new();
        account.push("dn", "uid=jeand,ou=people,dc=x");
        account.push("uid", "jeand");
        let mut group = LdifEntry::new();
        group.push("dn", "cn=jeand,ou=groups,dc=x");
        group.push("cn", "jeand");

        let account_path = store
            .write_deferred(EntryKind::Account, "jeand", &account)
            .await
            .unwrap();
        let group_path = store
            .write_deferred(EntryKind::Group, "jeand", &group)
            .await
            .unwrap();
        store
            .write_error_note(EntryKind::Account, "jeand", "connection refused")
            .await
            .unwrap();

        assert!(account_path.ends_with("ldif/jeand.ldif"));
        assert!(group_path.ends_with("ldif/group_jeand.ldif"));

        let accounts = store.read_deferred(EntryKind::Account).await.unwrap();
        let groups = store.read_deferred(EntryKind::Group).await.unwrap();
        assert_eq!(accounts, vec![account]);
        assert_eq!(groups, vec![group]);

        let note = std::fs::read_to_string(store.ldif_dir().join("jeand.error.txt")).unwrap();
        assert_eq!(note, "connection refused");
    }
}
