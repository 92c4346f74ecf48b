//! CLI configuration
//!
//! Keys are flat and environment-style (`DIRECTORY_URL`, `UID_START`, ...).
//! Optional string keys set to an empty value count as unset. Values are
//! read as strings and only converted for typed fields, so secrets such as
//! `BIND_PASSWORD=007` reach the directory unchanged.

use anyhow::Result;
use config::builder::{ConfigBuilder, DefaultState};
use serde::Deserialize;
use std::path::PathBuf;

use enrol_core::{
    AccountDefaults, AllocationRange, AllocationSettings, DirectorySettings, StoreSettings,
    TlsSettings, DEFAULT_BASE_DN, DEFAULT_HOMEDIR_BASE, DEFAULT_RANGE_MAX, DEFAULT_RANGE_START,
    DEFAULT_SHELL,
};

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub directory_url: Option<String>,
    pub bind_dn: Option<String>,
    pub bind_password: Option<String>,
    pub base_dn: String,
    pub connect_timeout_secs: u64,

    pub ca_file: Option<String>,
    pub client_cert_file: Option<String>,
    pub client_key_file: Option<String>,
    /// Accepts `true`/`1`/`yes`
    pub insecure: Option<String>,

    pub uid_start: u32,
    pub uid_max: u32,
    pub gid_start: u32,
    pub gid_max: u32,

    pub homedir_base: String,
    pub default_shell: String,
    pub data_dir: PathBuf,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_environment(config::Environment::default())
    }

    fn from_environment(environment: config::Environment) -> Result<Self> {
        let builder = with_defaults(config::Config::builder())?
            // Load from config file if present
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(environment);

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn directory(&self) -> DirectorySettings {
        DirectorySettings {
            url: non_empty(&self.directory_url),
            bind_dn: non_empty(&self.bind_dn),
            bind_password: non_empty(&self.bind_password),
            base_dn: if self.base_dn.trim().is_empty() {
                DEFAULT_BASE_DN.to_string()
            } else {
                self.base_dn.clone()
            },
            connect_timeout_secs: self.connect_timeout_secs,
        }
    }

    pub fn tls(&self) -> TlsSettings {
        TlsSettings {
            ca_file: non_empty(&self.ca_file).map(PathBuf::from),
            client_cert_file: non_empty(&self.client_cert_file).map(PathBuf::from),
            client_key_file: non_empty(&self.client_key_file).map(PathBuf::from),
            insecure: non_empty(&self.insecure).is_some_and(|v| {
                matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
            }),
        }
    }

    pub fn allocation(&self) -> Result<AllocationSettings> {
        Ok(AllocationSettings {
            uid: AllocationRange::new(self.uid_start, self.uid_max)?,
            gid: AllocationRange::new(self.gid_start, self.gid_max)?,
        })
    }

    pub fn account_defaults(&self) -> AccountDefaults {
        AccountDefaults {
            homedir_base: self.homedir_base.clone(),
            default_shell: self.default_shell.clone(),
        }
    }

    pub fn store(&self) -> StoreSettings {
        StoreSettings {
            data_dir: self.data_dir.clone(),
        }
    }
}

fn with_defaults(builder: ConfigBuilder<DefaultState>) -> Result<ConfigBuilder<DefaultState>> {
    Ok(builder
        .set_default("base_dn", DEFAULT_BASE_DN)?
        .set_default("connect_timeout_secs", 10)?
        .set_default("uid_start", i64::from(DEFAULT_RANGE_START))?
        .set_default("uid_max", i64::from(DEFAULT_RANGE_MAX))?
        .set_default("gid_start", i64::from(DEFAULT_RANGE_START))?
        .set_default("gid_max", i64::from(DEFAULT_RANGE_MAX))?
        .set_default("homedir_base", DEFAULT_HOMEDIR_BASE)?
        .set_default("default_shell", DEFAULT_SHELL)?
        .set_default("data_dir", "data")?)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
