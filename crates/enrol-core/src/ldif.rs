//! Deferred-import entries
//!
//! When a record cannot be written to the directory it is kept as a flat
//! `key: value` entry that an operator can import later. Keys are lower-case
//! and multi-valued attributes (`objectclass`, `memberuid`) repeat their key.

use std::fmt;

use crate::ids::{GidNumber, UidNumber};
use crate::models::{
    GroupRecord, IdentityRecord, ACCOUNT_OBJECT_CLASSES, GROUP_OBJECT_CLASSES,
};

/// Kind of deferred-import entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Account,
    Group,
}

/// An ordered list of attribute lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LdifEntry {
    lines: Vec<(String, String)>,
}

impl LdifEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &str, value: impl Into<String>) {
        self.lines.push((key.to_ascii_lowercase(), value.into()));
    }

    /// First value of `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// All values of `key` in file order
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn dn(&self) -> Option<&str> {
        self.get("dn")
    }

    /// Parse an entry. Each line is split on its first `:`; lines without one
    /// are skipped.
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .filter_map(|line| {
                let (key, value) = line.split_once(':')?;
                let key = key.trim();
                if key.is_empty() {
                    return None;
                }
                Some((key.to_ascii_lowercase(), value.trim().to_string()))
            })
            .collect();
        Self { lines }
    }

    pub fn from_account(dn: &str, account: &IdentityRecord) -> Self {
        let mut entry = Self::new();
        entry.push("dn", dn);
        entry.push("cn", &account.display_name);
        entry.push("sn", &account.surname);
        entry.push("uid", &account.login);
        entry.push("uidnumber", account.uid_number.to_string());
        entry.push("gidnumber", account.gid_number.to_string());
        entry.push("homedirectory", &account.home_directory);
        entry.push("loginshell", &account.login_shell);
        entry.push("mail", &account.mail);
        for class in ACCOUNT_OBJECT_CLASSES {
            entry.push("objectclass", class);
        }
        if let Some(credential) = &account.credential {
            entry.push("userpassword", credential);
        }
        entry
    }

    pub fn from_group(dn: &str, group: &GroupRecord) -> Self {
        let mut entry = Self::new();
        entry.push("dn", dn);
        entry.push("cn", &group.name);
        entry.push("gidnumber", group.gid.to_string());
        for member in &group.members {
            entry.push("memberuid", member);
        }
        for class in GROUP_OBJECT_CLASSES {
            entry.push("objectclass", class);
        }
        entry
    }

    /// Read the entry back as an account. Requires `uid`; numeric ids that
    /// fail to parse read as zero.
    pub fn to_account(&self) -> Option<IdentityRecord> {
        let login = self.get("uid")?.to_string();
        let text = |key: &str| self.get(key).unwrap_or_default().to_string();
        Some(IdentityRecord {
            login,
            display_name: text("cn"),
            surname: text("sn"),
            uid_number: UidNumber::new(self.number("uidnumber").unwrap_or(0)),
            gid_number: GidNumber::new(self.number("gidnumber").unwrap_or(0)),
            home_directory: text("homedirectory"),
            login_shell: text("loginshell"),
            mail: text("mail"),
            credential: None,
        })
    }

    /// Read the entry back as a group. Requires `cn`.
    pub fn to_group(&self) -> Option<GroupRecord> {
        let name = self.get("cn")?.to_string();
        Some(GroupRecord {
            name,
            gid: GidNumber::new(self.number("gidnumber").unwrap_or(0)),
            members: self
                .get_all("memberuid")
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
    }

    pub fn number(&self, key: &str) -> Option<u32> {
        self.get(key)?.parse().ok()
    }
}

impl fmt::Display for LdifEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.lines {
            writeln!(f, "{}: {}", key, value)?;
        }
        Ok(())
    }
}
