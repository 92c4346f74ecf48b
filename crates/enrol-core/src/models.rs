//! Domain models for accounts, groups and provisioning settings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::{EnrolError, Result};
use crate::ids::{GidNumber, UidNumber};

pub const DEFAULT_BASE_DN: &str = "dc=homelab,dc=churlet,dc=eu";
pub const DEFAULT_HOMEDIR_BASE: &str = "/mnt/pool/users";
pub const DEFAULT_SHELL: &str = "/usr/sbin/nologin";
pub const DEFAULT_RANGE_START: u32 = 3000;
pub const DEFAULT_RANGE_MAX: u32 = 4000;

/// Object classes of a provisioned account entry
pub const ACCOUNT_OBJECT_CLASSES: [&str; 4] = ["inetOrgPerson", "posixAccount", "person", "top"];

/// Object classes of a group entry
pub const GROUP_OBJECT_CLASSES: [&str; 2] = ["posixGroup", "top"];

// =============================================================================
// Identifier Allocation
// =============================================================================

/// Class of numeric identifier being allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdClass {
    User,
    Group,
}

impl fmt::Display for IdClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user id"),
            Self::Group => write!(f, "group id"),
        }
    }
}

/// Half-open window `[start, max)` of valid identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRange {
    pub start: u32,
    pub max: u32,
}

impl AllocationRange {
    pub fn new(start: u32, max: u32) -> Result<Self> {
        if start >= max {
            return Err(EnrolError::config_error(format!(
                "allocation range start {} must be below max {}",
                start, max
            )));
        }
        Ok(Self { start, max })
    }

    pub fn contains(&self, value: u32) -> bool {
        value >= self.start && value < self.max
    }
}

impl Default for AllocationRange {
    fn default() -> Self {
        Self {
            start: DEFAULT_RANGE_START,
            max: DEFAULT_RANGE_MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationSettings {
    pub uid: AllocationRange,
    pub gid: AllocationRange,
}

impl AllocationSettings {
    pub fn range(&self, class: IdClass) -> AllocationRange {
        match class {
            IdClass::User => self.uid,
            IdClass::Group => self.gid,
        }
    }
}

// =============================================================================
// Connection & Storage Settings
// =============================================================================

/// Directory connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct DirectorySettings {
    /// Directory URL (e.g., "ldaps://ldap.homelab.lan:636")
    pub url: Option<String>,
    pub bind_dn: Option<String>,
    #[serde(skip_serializing)]
    pub bind_password: Option<String>,
    pub base_dn: String,
    pub connect_timeout_secs: u64,
}

impl DirectorySettings {
    /// True when URL and both bind credentials are present and non-empty
    pub fn is_complete(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.url) && present(&self.bind_dn) && present(&self.bind_password)
    }

    pub fn layout(&self) -> DnLayout {
        DnLayout::new(self.base_dn.clone())
    }
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            url: None,
            bind_dn: None,
            bind_password: None,
            base_dn: DEFAULT_BASE_DN.to_string(),
            connect_timeout_secs: 10,
        }
    }
}

impl fmt::Debug for DirectorySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectorySettings")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &self.bind_password.as_ref().map(|_| "[REDACTED]"))
            .field("base_dn", &self.base_dn)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Transport security material locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsSettings {
    pub ca_file: Option<PathBuf>,
    pub client_cert_file: Option<PathBuf>,
    pub client_key_file: Option<PathBuf>,
    /// Disable server certificate verification (testing only)
    #[serde(default)]
    pub insecure: bool,
}

/// Attributes applied to every new account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountDefaults {
    pub homedir_base: String,
    pub default_shell: String,
}

impl AccountDefaults {
    pub fn home_directory(&self, login: &str) -> String {
        format!("{}/{}", self.homedir_base.trim_end_matches('/'), login)
    }
}

impl Default for AccountDefaults {
    fn default() -> Self {
        Self {
            homedir_base: DEFAULT_HOMEDIR_BASE.to_string(),
            default_shell: DEFAULT_SHELL.to_string(),
        }
    }
}

/// Location of the local record store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    pub data_dir: PathBuf,
}

impl StoreSettings {
    pub fn groups_file(&self) -> PathBuf {
        self.data_dir.join("groups.json")
    }

    pub fn ldif_dir(&self) -> PathBuf {
        self.data_dir.join("ldif")
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

// =============================================================================
// Directory Layout
// =============================================================================

/// Builds distinguished names under a base DN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnLayout {
    base_dn: String,
}

impl DnLayout {
    pub fn new(base_dn: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
        }
    }

    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    pub fn people_base(&self) -> String {
        format!("ou=people,{}", self.base_dn)
    }

    pub fn groups_base(&self) -> String {
        format!("ou=groups,{}", self.base_dn)
    }

    pub fn account_dn(&self, login: &str) -> String {
        format!("uid={},{}", login, self.people_base())
    }

    pub fn group_dn(&self, name: &str) -> String {
        format!("cn={},{}", name, self.groups_base())
    }
}

impl Default for DnLayout {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DN)
    }
}

// =============================================================================
// Records
// =============================================================================

/// A POSIX account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub login: String,
    /// Full name, stored as `cn`
    pub display_name: String,
    pub surname: String,
    pub uid_number: UidNumber,
    pub gid_number: GidNumber,
    pub home_directory: String,
    pub login_shell: String,
    pub mail: String,
    /// Credential digest; never read back from listings
    #[serde(skip_serializing, default)]
    pub credential: Option<String>,
}

/// A POSIX group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    #[serde(alias = "cn")]
    pub name: String,
    #[serde(alias = "gidnumber")]
    pub gid: GidNumber,
    /// Member login names in insertion order; duplicates are tolerated
    #[serde(alias = "memberuid", default)]
    pub members: Vec<String>,
}

impl GroupRecord {
    pub fn new(name: impl Into<String>, gid: GidNumber) -> Self {
        Self {
            name: name.into(),
            gid,
            members: vec![],
        }
    }

    /// The group created alongside a new account, containing only that account
    pub fn personal(login: &str, gid: GidNumber) -> Self {
        Self {
            name: login.to_string(),
            gid,
            members: vec![login.to_string()],
        }
    }
}

/// Where a listed record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    Directory,
    LocalStore,
    Deferred,
}

impl fmt::Display for RecordOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory => write!(f, "directory"),
            Self::LocalStore => write!(f, "local_store"),
            Self::Deferred => write!(f, "deferred"),
        }
    }
}

/// A record together with its DN and origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sourced<T> {
    pub dn: String,
    pub origin: RecordOrigin,
    #[serde(flatten)]
    pub record: T,
}

impl<T> Sourced<T> {
    pub fn new(dn: impl Into<String>, origin: RecordOrigin, record: T) -> Self {
        Self {
            dn: dn.into(),
            origin,
            record,
        }
    }
}

// =============================================================================
// Requests & Outcomes
// =============================================================================

/// An accepted signup to provision
#[derive(Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl NewAccount {
    /// Every field ends up on a single `key: value` line of a deferred entry
    pub fn validate(&self) -> Result<()> {
        single_line("first name", &self.first_name)?;
        single_line("last name", &self.last_name)?;
        single_line("email", &self.email)
    }
}

/// Attribute replacements for an existing account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountChanges {
    pub mail: Option<String>,
    pub login_shell: Option<String>,
    pub display_name: Option<String>,
}

impl AccountChanges {
    pub fn is_empty(&self) -> bool {
        self.mail.is_none() && self.login_shell.is_none() && self.display_name.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("mail", &self.mail),
            ("login shell", &self.login_shell),
            ("display name", &self.display_name),
        ] {
            if let Some(value) = value {
                single_line(field, value)?;
            }
        }
        Ok(())
    }
}

/// Characters with a meaning inside a distinguished name
const DN_SPECIALS: [char; 9] = [',', '=', '+', '<', '>', '#', ';', '"', '\\'];

/// Check a login or group name. Names become both the value of a relative DN
/// and a file name under the deferred-entry directory.
pub fn validate_entry_name(entity: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(EnrolError::invalid_input(format!("{} name is required", entity)));
    }
    if name == "." || name == ".." {
        return Err(EnrolError::invalid_input(format!(
            "{} name cannot be {:?}",
            entity, name
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_control() || *c == '/' || DN_SPECIALS.contains(c))
    {
        return Err(EnrolError::invalid_input(format!(
            "{} name {:?} contains {:?}",
            entity, name, c
        )));
    }
    Ok(())
}

fn single_line(field: &str, value: &str) -> Result<()> {
    if value.chars().any(char::is_control) {
        return Err(EnrolError::invalid_input(format!(
            "{} must not contain control characters",
            field
        )));
    }
    Ok(())
}

/// Which backend ended up holding a provisioned record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionVia {
    Directory,
    Fallback,
}

impl fmt::Display for ProvisionVia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory => write!(f, "directory"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Result of provisioning an account and its personal group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionOutcome {
    pub via: ProvisionVia,
    pub login: String,
    pub dn: String,
    pub group_dn: String,
    pub uid_number: UidNumber,
    pub gid_number: GidNumber,
    /// Deferred-import entry for the account, when the fallback was used
    pub account_file: Option<String>,
    pub group_file: String,
    pub error_note: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Result of creating a standalone group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupOutcome {
    pub via: ProvisionVia,
    pub name: String,
    pub dn: String,
    pub gid: GidNumber,
    pub group_file: String,
    pub error_note: Option<String>,
    pub completed_at: DateTime<Utc>,
}
