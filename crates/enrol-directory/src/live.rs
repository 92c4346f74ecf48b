//! Directory backend speaking LDAP
//!
//! Each operation opens a fresh connection, binds with the service account,
//! runs its requests and unbinds before returning, whether the requests
//! succeeded or not.

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Mod, Scope, SearchEntry};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use enrol_core::{
    AccountChanges, DirectoryBackend, DirectorySettings, DnLayout, EnrolError, GidNumber,
    GroupRecord, IdentityRecord, RecordOrigin, Result, Sourced, TlsSettings, UidNumber,
    ACCOUNT_OBJECT_CLASSES, GROUP_OBJECT_CLASSES,
};

use crate::transport::TransportConfigurator;

const ACCOUNT_FILTER: &str = "(objectClass=posixAccount)";
const GROUP_FILTER: &str = "(objectClass=posixGroup)";

/// A configured directory service. The transport profile is rebuilt on every
/// connection so changed certificate files are picked up.
pub struct LiveDirectory {
    directory: DirectorySettings,
    tls: TlsSettings,
    layout: DnLayout,
}

impl LiveDirectory {
    pub fn new(directory: DirectorySettings, tls: TlsSettings) -> Self {
        let layout = directory.layout();
        Self {
            directory,
            tls,
            layout,
        }
    }

    fn url(&self) -> &str {
        self.directory.url.as_deref().unwrap_or_default()
    }

    async fn connect(&self) -> Result<Ldap> {
        let profile = TransportConfigurator::configure(&self.directory, &self.tls)
            .await?
            .profile;
        let bind = profile
            .bind
            .as_ref()
            .ok_or_else(|| EnrolError::config_error("Directory bind credentials are not set"))?;

        let mut settings = LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(profile.connect_timeout_secs))
            .set_no_tls_verify(profile.insecure);

        if profile.has_custom_tls() {
            settings = settings.set_connector(profile.tls_connector()?);
        }

        debug!(url = %profile.url, "Connecting to directory");

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &profile.url)
            .await
            .map_err(|e| transport("connection", e))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("Directory connection driver error: {}", e);
            }
        });

        let bound = ldap
            .simple_bind(&bind.dn, &bind.password)
            .await
            .and_then(|r| r.success());

        if let Err(e) = bound {
            release(ldap).await;
            return Err(transport("bind", e));
        }

        Ok(ldap)
    }

    async fn search(&self, ldap: &mut Ldap, base: &str, filter: &str) -> Result<Vec<SearchEntry>> {
        let (entries, _result) = ldap
            .search(base, Scope::Subtree, filter, vec!["*"])
            .await
            .and_then(|r| r.success())
            .map_err(|e| transport("search", e))?;

        Ok(entries.into_iter().map(SearchEntry::construct).collect())
    }

    async fn add(ldap: &mut Ldap, dn: &str, attrs: Vec<(String, HashSet<String>)>) -> Result<()> {
        ldap.add(dn, attrs)
            .await
            .and_then(|r| r.success())
            .map_err(|e| transport(&format!("add of {}", dn), e))?;
        Ok(())
    }
}

#[async_trait]
impl DirectoryBackend for LiveDirectory {
    fn name(&self) -> &'static str {
        "live"
    }

    fn is_live(&self) -> bool {
        true
    }

    #[instrument(skip(self), fields(url = %self.url()))]
    async fn search_accounts(&self) -> Result<Vec<Sourced<IdentityRecord>>> {
        let mut ldap = self.connect().await?;
        let result = self
            .search(&mut ldap, &self.layout.people_base(), ACCOUNT_FILTER)
            .await;
        release(ldap).await;

        let accounts: Vec<_> = result?.iter().filter_map(entry_to_account).collect();
        debug!("Fetched {} accounts from directory", accounts.len());
        Ok(accounts)
    }

    #[instrument(skip(self), fields(url = %self.url()))]
    async fn search_groups(&self) -> Result<Vec<Sourced<GroupRecord>>> {
        let mut ldap = self.connect().await?;
        let result = self
            .search(&mut ldap, &self.layout.groups_base(), GROUP_FILTER)
            .await;
        release(ldap).await;

        let groups: Vec<_> = result?.iter().filter_map(entry_to_group).collect();
        debug!("Fetched {} groups from directory", groups.len());
        Ok(groups)
    }

    #[instrument(skip(self, group), fields(dn = %dn))]
    async fn add_group(&self, dn: &str, group: &GroupRecord) -> Result<()> {
        let mut ldap = self.connect().await?;
        let result = Self::add(&mut ldap, dn, group_attributes(group)).await;
        release(ldap).await;

        result?;
        info!("Added group entry");
        Ok(())
    }

    #[instrument(skip(self, group, account), fields(group_dn = %group_dn, account_dn = %account_dn))]
    async fn add_account_with_group(
        &self,
        group_dn: &str,
        group: &GroupRecord,
        account_dn: &str,
        account: &IdentityRecord,
    ) -> Result<()> {
        let mut ldap = self.connect().await?;

        let mut result = Self::add(&mut ldap, group_dn, group_attributes(group)).await;
        if result.is_ok() {
            result = Self::add(&mut ldap, account_dn, account_attributes(account)).await;
        }
        release(ldap).await;

        result?;
        info!("Added group and account entries");
        Ok(())
    }

    #[instrument(skip(self, changes), fields(dn = %dn))]
    async fn modify_account(&self, dn: &str, changes: &AccountChanges) -> Result<()> {
        let mods = account_mods(changes);
        if mods.is_empty() {
            return Ok(());
        }

        let mut ldap = self.connect().await?;
        let result = ldap
            .modify(dn, mods)
            .await
            .and_then(|r| r.success())
            .map_err(|e| transport(&format!("modify of {}", dn), e));
        release(ldap).await;

        result?;
        info!("Modified account entry");
        Ok(())
    }

    #[instrument(skip(self), fields(dn = %dn))]
    async fn delete_entry(&self, dn: &str) -> Result<()> {
        let mut ldap = self.connect().await?;
        let result = ldap
            .delete(dn)
            .await
            .and_then(|r| r.success())
            .map_err(|e| transport(&format!("delete of {}", dn), e));
        release(ldap).await;

        result?;
        info!("Deleted directory entry");
        Ok(())
    }
}

async fn release(mut ldap: Ldap) {
    if let Err(e) = ldap.unbind().await {
        warn!("Directory unbind failed: {}", e);
    }
}

fn transport(step: &str, e: LdapError) -> EnrolError {
    EnrolError::transport(format!("Directory {} failed: {}", step, e))
}

fn values<I, S>(items: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

fn group_attributes(group: &GroupRecord) -> Vec<(String, HashSet<String>)> {
    let mut attrs = vec![
        ("cn".to_string(), values([group.name.as_str()])),
        (GidNumber::attribute().to_string(), values([group.gid.to_string()])),
        ("objectClass".to_string(), values(GROUP_OBJECT_CLASSES)),
    ];
    if !group.members.is_empty() {
        attrs.push(("memberUid".to_string(), values(group.members.iter().cloned())));
    }
    attrs
}

fn account_attributes(account: &IdentityRecord) -> Vec<(String, HashSet<String>)> {
    let mut attrs = vec![
        ("cn".to_string(), values([account.display_name.as_str()])),
        ("sn".to_string(), values([account.surname.as_str()])),
        ("uid".to_string(), values([account.login.as_str()])),
        (UidNumber::attribute().to_string(), values([account.uid_number.to_string()])),
        (GidNumber::attribute().to_string(), values([account.gid_number.to_string()])),
        ("homeDirectory".to_string(), values([account.home_directory.as_str()])),
        ("loginShell".to_string(), values([account.login_shell.as_str()])),
        ("mail".to_string(), values([account.mail.as_str()])),
        ("objectClass".to_string(), values(ACCOUNT_OBJECT_CLASSES)),
    ];
    if let Some(credential) = &account.credential {
        attrs.push(("userPassword".to_string(), values([credential.as_str()])));
    }
    attrs
}

fn account_mods(changes: &AccountChanges) -> Vec<Mod<String>> {
    [
        ("mail", &changes.mail),
        ("loginShell", &changes.login_shell),
        ("cn", &changes.display_name),
    ]
    .into_iter()
    .filter_map(|(attr, value)| {
        value
            .as_ref()
            .map(|v| Mod::Replace(attr.to_string(), values([v.as_str()])))
    })
    .collect()
}

fn attr<'a>(entry: &'a SearchEntry, name: &str) -> Option<&'a Vec<String>> {
    entry
        .attrs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn first(entry: &SearchEntry, name: &str) -> Option<String> {
    attr(entry, name)?.first().cloned()
}

fn number(entry: &SearchEntry, name: &str) -> Option<u32> {
    first(entry, name)?.trim().parse().ok()
}

fn entry_to_account(entry: &SearchEntry) -> Option<Sourced<IdentityRecord>> {
    let login = first(entry, "uid")?;
    let text = |name: &str| first(entry, name).unwrap_or_default();

    Some(Sourced::new(
        entry.dn.clone(),
        RecordOrigin::Directory,
        IdentityRecord {
            login,
            display_name: text("cn"),
            surname: text("sn"),
            uid_number: UidNumber::new(number(entry, UidNumber::attribute()).unwrap_or(0)),
            gid_number: GidNumber::new(number(entry, GidNumber::attribute()).unwrap_or(0)),
            home_directory: text("homeDirectory"),
            login_shell: text("loginShell"),
            mail: text("mail"),
            credential: None,
        },
    ))
}

fn entry_to_group(entry: &SearchEntry) -> Option<Sourced<GroupRecord>> {
    let name = first(entry, "cn")?;

    Some(Sourced::new(
        entry.dn.clone(),
        RecordOrigin::Directory,
        GroupRecord {
            name,
            gid: GidNumber::new(number(entry, GidNumber::attribute()).unwrap_or(0)),
            members: attr(entry, "memberUid").cloned().unwrap_or_default(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn search_entry(dn: &str, attrs: &[(&str, &[&str])]) -> SearchEntry {
        SearchEntry {
            dn: dn.to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
                .collect::<HashMap<_, _>>(),
            bin_attrs: HashMap::new(),
        }
    }

    #[test]
    fn test_entry_to_account_is_case_insensitive() {
        let entry = search_entry(
            "uid=jeand,ou=people,dc=x",
            &[
                ("uid", &["jeand"]),
                ("cn", &["Jean Dupont"]),
                ("uidnumber", &["3000"]),
                ("gidNumber", &["3000"]),
                ("homeDirectory", &["/mnt/pool/users/jeand"]),
            ],
        );
        let account = entry_to_account(&entry).unwrap();
        assert_eq!(account.origin, RecordOrigin::Directory);
        assert_eq!(account.record.uid_number, UidNumber::new(3000));
        assert_eq!(account.record.gid_number, GidNumber::new(3000));
        assert_eq!(account.record.mail, "");
    }

    #[test]
    fn test_entry_without_uid_is_skipped() {
        let entry = search_entry("cn=x,dc=x", &[("cn", &["x"])]);
        assert!(entry_to_account(&entry).is_none());
    }

    #[test]
    fn test_entry_to_group_collects_members() {
        let entry = search_entry(
            "cn=devs,ou=groups,dc=x",
            &[("cn", &["devs"]), ("gidNumber", &["3010"]), ("memberUid", &["a", "b"])],
        );
        let group = entry_to_group(&entry).unwrap();
        assert_eq!(group.record.members, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_group_attributes_skip_empty_members() {
        let group = GroupRecord::new("devs", GidNumber::new(3010));
        let attrs = group_attributes(&group);
        assert!(attrs.iter().all(|(k, _)| k != "memberUid"));
        assert!(attrs.iter().any(|(k, v)| k == "gidNumber" && v.contains("3010")));
    }

    #[test]
    fn test_account_attributes_include_password_when_present() {
        let account = IdentityRecord {
            login: "jeand".to_string(),
            display_name: "Jean Dupont".to_string(),
            surname: "Dupont".to_string(),
            uid_number: UidNumber::new(3000),
            gid_number: GidNumber::new(3000),
            home_directory: "/mnt/pool/users/jeand".to_string(),
            login_shell: "/usr/sbin/nologin".to_string(),
            mail: "jean@x.co".to_string(),
            credential: Some("{SSHA}abc".to_string()),
        };
        let attrs = account_attributes(&account);
        assert!(attrs.iter().any(|(k, _)| k == "userPassword"));
        let classes = &attrs.iter().find(|(k, _)| k == "objectClass").unwrap().1;
        assert_eq!(classes.len(), 4);
    }

    #[test]
    fn test_account_mods_only_for_given_fields() {
        let changes = AccountChanges {
            mail: Some("new@x.co".to_string()),
            ..Default::default()
        };
        let mods = account_mods(&changes);
        assert_eq!(mods.len(), 1);
        assert!(matches!(&mods[0], Mod::Replace(attr, _) if attr == "mail"));
    }
}
