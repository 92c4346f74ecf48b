//! Settings-driven backend selection

use std::sync::Arc;
use tracing::debug;

use enrol_core::{BackendFactory, DirectoryBackend, DirectorySettings, DnLayout, TlsSettings};

use crate::live::LiveDirectory;
use crate::unconfigured::Unconfigured;

/// Chooses [`LiveDirectory`] when URL and bind credentials are all present,
/// [`Unconfigured`] otherwise.
#[derive(Debug, Clone)]
pub struct DirectoryFactory {
    directory: DirectorySettings,
    tls: TlsSettings,
}

impl DirectoryFactory {
    pub fn new(directory: DirectorySettings, tls: TlsSettings) -> Self {
        Self { directory, tls }
    }
}

impl BackendFactory for DirectoryFactory {
    fn select(&self) -> Arc<dyn DirectoryBackend> {
        if !self.directory.is_complete() {
            debug!("Directory not configured, using local record store only");
            return Arc::new(Unconfigured);
        }

        Arc::new(LiveDirectory::new(self.directory.clone(), self.tls.clone()))
    }

    fn layout(&self) -> DnLayout {
        self.directory.layout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_settings_select_unconfigured() {
        let factory = DirectoryFactory::new(
            DirectorySettings {
                url: Some("ldap://localhost".to_string()),
                ..Default::default()
            },
            TlsSettings::default(),
        );
        let backend = factory.select();
        assert!(!backend.is_live());
        assert_eq!(backend.name(), "unconfigured");
    }

    #[test]
    fn test_complete_settings_select_live() {
        let factory = DirectoryFactory::new(
            DirectorySettings {
                url: Some("ldap://localhost:389".to_string()),
                bind_dn: Some("cn=admin,dc=homelab,dc=churlet,dc=eu".to_string()),
                bind_password: Some("secret".to_string()),
                ..Default::default()
            },
            TlsSettings::default(),
        );
        let backend = factory.select();
        assert!(backend.is_live());
        assert_eq!(backend.name(), "live");
    }

    #[test]
    fn test_layout_follows_base_dn() {
        let factory = DirectoryFactory::new(
            DirectorySettings {
                base_dn: "dc=example,dc=org".to_string(),
                ..Default::default()
            },
            TlsSettings::default(),
        );
        assert_eq!(factory.layout().people_base(), "ou=people,dc=example,dc=org");
    }

    #[tokio::test]
    async fn test_unconfigured_refuses_everything() {
        let backend = Unconfigured;
        assert!(matches!(
            backend.search_accounts().await,
            Err(enrol_core::EnrolError::DirectoryUnavailable)
        ));
        assert!(backend.delete_entry("uid=x").await.unwrap_err().is_recoverable());
    }
}
