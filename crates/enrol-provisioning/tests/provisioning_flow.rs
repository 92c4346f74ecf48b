//! End-to-end provisioning flows over the file-backed record store
//!
//! The live directory tests need a reachable directory server and are
//! ignored by default. Set the following environment variables:
//! - ENROL_TEST_DIRECTORY_URL: e.g. ldap://localhost:389
//! - ENROL_TEST_BIND_DN: an account allowed to add and delete entries
//! - ENROL_TEST_BIND_PASSWORD
//! - ENROL_TEST_BASE_DN (default: dc=homelab,dc=churlet,dc=eu)
//!
//! Run with: cargo test -p enrol-provisioning --test provisioning_flow -- --ignored

use std::sync::Arc;

use enrol_core::{
    AccountDefaults, AllocationSettings, DirectorySettings, EntryKind, GidNumber, NewAccount,
    ProvisionVia, RecordOrigin, RecordStore, TlsSettings, UidNumber, DEFAULT_BASE_DN,
};
use enrol_directory::DirectoryFactory;
use enrol_provisioning::{Provisioner, Reconciler};
use enrol_store::FileRecordStore;

// =============================================================================
// Test Fixtures
// =============================================================================

struct Workspace {
    _dir: tempfile::TempDir,
    store: Arc<FileRecordStore>,
    provisioner: Provisioner<FileRecordStore>,
    reconciler: Reconciler<FileRecordStore>,
}

fn workspace(directory: DirectorySettings) -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileRecordStore::open(dir.path()));
    let factory = Arc::new(DirectoryFactory::new(directory, TlsSettings::default()));

    Workspace {
        provisioner: Provisioner::new(
            store.clone(),
            factory.clone(),
            AllocationSettings::default(),
            AccountDefaults::default(),
        ),
        reconciler: Reconciler::new(store.clone(), factory),
        _dir: dir,
        store,
    }
}

fn request(first: &str, last: &str, email: &str) -> NewAccount {
    NewAccount {
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: email.to_string(),
        password: "s3cret".to_string(),
    }
}

/// Directory settings from the environment, when a test directory is set up
fn live_settings() -> Option<DirectorySettings> {
    let url = std::env::var("ENROL_TEST_DIRECTORY_URL").ok()?;
    Some(DirectorySettings {
        url: Some(url),
        bind_dn: std::env::var("ENROL_TEST_BIND_DN").ok(),
        bind_password: std::env::var("ENROL_TEST_BIND_PASSWORD").ok(),
        base_dn: std::env::var("ENROL_TEST_BASE_DN")
            .unwrap_or_else(|_| DEFAULT_BASE_DN.to_string()),
        connect_timeout_secs: 5,
    })
}

/// Creates a unique name suffix to avoid conflicts between test runs
fn test_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis();
    format!("{}", millis % 1_000_000)
}

// =============================================================================
// Fallback Flow Tests
// =============================================================================

#[tokio::test]
async fn test_provision_without_directory() {
    let ws = workspace(DirectorySettings::default());

    let jean = ws
        .provisioner
        .provision(&request("Jean", "Dupont", "j@x.co"))
        .await
        .unwrap();

    assert_eq!(jean.via, ProvisionVia::Fallback);
    assert_eq!(jean.login, "jeand");
    assert_eq!(jean.uid_number, UidNumber::new(3000));
    assert_eq!(jean.gid_number, GidNumber::new(3000));
    assert!(jean.error_note.is_none());

    let account_file = jean.account_file.clone().unwrap();
    assert!(account_file.ends_with("jeand.ldif"));
    assert!(jean.group_file.ends_with("group_jeand.ldif"));

    let ldif = std::fs::read_to_string(&account_file).unwrap();
    assert!(ldif.starts_with("dn: uid=jeand,ou=people,dc=homelab,dc=churlet,dc=eu\n"));
    assert!(ldif.contains("homedirectory: /mnt/pool/users/jeand\n"));
    assert!(ldif.contains("loginshell: /usr/sbin/nologin\n"));
    assert!(ldif.contains("userpassword: {SSHA}"));

    let groups = ws.store.read_groups().await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "jeand");
    assert_eq!(groups[0].members, vec!["jeand".to_string()]);

    let marie = ws
        .provisioner
        .provision(&request("Marie", "Dupont", "m@x.co"))
        .await
        .unwrap();
    assert_eq!(marie.login, "maried");
    assert_eq!(marie.uid_number, UidNumber::new(3001));
    assert_eq!(marie.gid_number, GidNumber::new(3001));
}

#[tokio::test]
async fn test_fallback_records_are_listed() {
    let ws = workspace(DirectorySettings::default());
    ws.provisioner
        .provision(&request("Émilie", "Zola", "e@x.co"))
        .await
        .unwrap();
    ws.provisioner.create_group("media", None).await.unwrap();

    let accounts = ws.reconciler.list_accounts().await;
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].record.login, "emiliez");
    assert_eq!(accounts[0].record.display_name, "Émilie Zola");

    let groups = ws.reconciler.list_groups().await;
    let names: Vec<&str> = groups.iter().map(|g| g.record.name.as_str()).collect();
    assert_eq!(names, vec!["emiliez", "media"]);
    assert!(groups.iter().all(|g| g.origin == RecordOrigin::LocalStore));
}

#[tokio::test]
async fn test_unreachable_directory_leaves_error_note() {
    let ws = workspace(DirectorySettings {
        url: Some("ldap://127.0.0.1:1".to_string()),
        bind_dn: Some("cn=admin,dc=homelab,dc=churlet,dc=eu".to_string()),
        bind_password: Some("admin".to_string()),
        connect_timeout_secs: 2,
        ..Default::default()
    });

    let outcome = ws
        .provisioner
        .provision(&request("Jean", "Dupont", "j@x.co"))
        .await
        .unwrap();

    assert_eq!(outcome.via, ProvisionVia::Fallback);
    assert_eq!(outcome.uid_number, UidNumber::new(3000));
    let note = outcome.error_note.expect("error note");
    assert!(note.ends_with("jeand.error.txt"));
    assert!(!std::fs::read_to_string(note).unwrap().is_empty());

    assert_eq!(ws.store.read_deferred(EntryKind::Account).await.unwrap().len(), 1);
    assert_eq!(ws.reconciler.list_accounts().await.len(), 1);
}

// =============================================================================
// Live Directory Tests
// =============================================================================

#[tokio::test]
#[ignore = "Requires a running directory server"]
async fn test_provision_update_delete_against_directory() {
    let Some(settings) = live_settings() else {
        eprintln!("Skipping: ENROL_TEST_DIRECTORY_URL not set");
        return;
    };
    let ws = workspace(settings);
    let first = format!("Enrol{}", test_suffix());

    let outcome = ws
        .provisioner
        .provision(&request(&first, "Test", "enrol-test@x.co"))
        .await
        .unwrap();
    assert_eq!(outcome.via, ProvisionVia::Directory);
    assert!(outcome.account_file.is_none());

    let accounts = ws.reconciler.list_accounts().await;
    assert!(accounts.iter().any(|a| a.record.login == outcome.login));

    let changes = enrol_core::AccountChanges {
        login_shell: Some("/bin/bash".to_string()),
        ..Default::default()
    };
    ws.provisioner
        .update_account(&outcome.login, &changes)
        .await
        .unwrap();

    let dn = ws.provisioner.delete_account(&outcome.login).await.unwrap();
    assert_eq!(dn, outcome.dn);
}
