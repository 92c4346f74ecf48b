//! Transport configuration for reaching the directory service
//!
//! A [`TransportProfile`] is built fresh before every directory operation and
//! never mutated afterwards. Material is read with `tokio::fs` since
//! configuration runs inside the async operation it precedes. Unreadable CA, certificate or key files do not
//! fail configuration: the material is left out and a diagnostic is returned
//! next to the profile, so the handshake is what eventually fails if the
//! material was needed.

use std::fmt;
use std::path::{Path, PathBuf};

use native_tls::{Certificate, Identity, TlsConnector};
use tracing::{debug, warn};

use enrol_core::{DirectorySettings, EnrolError, Result, TlsSettings};

/// Simple-bind credentials
#[derive(Clone)]
pub struct BindCredentials {
    pub dn: String,
    pub password: String,
}

impl fmt::Debug for BindCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindCredentials")
            .field("dn", &self.dn)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Everything needed to open a connection to the directory
#[derive(Debug, Clone)]
pub struct TransportProfile {
    pub url: String,
    pub bind: Option<BindCredentials>,
    pub ca: Option<Vec<u8>>,
    pub client_cert: Option<Vec<u8>>,
    pub client_key: Option<Vec<u8>>,
    pub insecure: bool,
    pub connect_timeout_secs: u64,
}

impl TransportProfile {
    /// Whether a custom TLS connector is needed instead of the system default
    pub fn has_custom_tls(&self) -> bool {
        self.ca.is_some() || self.client_identity().is_some() || self.insecure
    }

    fn client_identity(&self) -> Option<(&[u8], &[u8])> {
        match (&self.client_cert, &self.client_key) {
            (Some(cert), Some(key)) => Some((cert.as_slice(), key.as_slice())),
            _ => None,
        }
    }

    /// Build the TLS connector carrying the CA, client identity and
    /// verification policy of this profile.
    pub fn tls_connector(&self) -> Result<TlsConnector> {
        let mut builder = TlsConnector::builder();

        if let Some(ca) = &self.ca {
            let cert = Certificate::from_pem(ca)
                .map_err(|e| EnrolError::transport(format!("Invalid CA certificate: {}", e)))?;
            builder.add_root_certificate(cert);
        }

        if let Some((cert, key)) = self.client_identity() {
            let identity = Identity::from_pkcs8(cert, key)
                .map_err(|e| EnrolError::transport(format!("Invalid client identity: {}", e)))?;
            builder.identity(identity);
        }

        if self.insecure {
            builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }

        builder
            .build()
            .map_err(|e| EnrolError::transport(format!("TLS setup failed: {}", e)))
    }
}

/// Result of loading one piece of TLS material. Failure is carried as a
/// diagnostic rather than an error.
#[derive(Debug)]
pub(crate) struct MaterialLoad {
    pub bytes: Option<Vec<u8>>,
    pub diagnostic: Option<EnrolError>,
}

impl MaterialLoad {
    fn absent() -> Self {
        Self {
            bytes: None,
            diagnostic: None,
        }
    }
}

/// A profile plus whatever went wrong while loading its material
#[derive(Debug)]
pub struct ConfiguredTransport {
    pub profile: TransportProfile,
    pub diagnostics: Vec<EnrolError>,
}

/// Builds transport profiles from settings
pub struct TransportConfigurator;

impl TransportConfigurator {
    pub async fn configure(
        directory: &DirectorySettings,
        tls: &TlsSettings,
    ) -> Result<ConfiguredTransport> {
        let url = directory
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| EnrolError::config_error("DIRECTORY_URL is not set"))?
            .to_string();

        let bind = match (&directory.bind_dn, &directory.bind_password) {
            (Some(dn), Some(password)) if !dn.trim().is_empty() && !password.is_empty() => {
                Some(BindCredentials {
                    dn: dn.clone(),
                    password: password.clone(),
                })
            }
            _ => None,
        };

        let mut diagnostics = Vec::new();
        let mut take = |load: MaterialLoad| {
            if let Some(diagnostic) = load.diagnostic {
                warn!("{}; continuing without it", diagnostic);
                diagnostics.push(diagnostic);
            }
            load.bytes
        };

        let ca = take(load_material("CA certificate", tls.ca_file.as_deref()).await);
        let client_cert = take(
            load_material("client certificate", tls.client_cert_file.as_deref()).await,
        );
        let client_key = take(load_material("client key", tls.client_key_file.as_deref()).await);

        if tls.insecure {
            warn!(
                target: "security",
                url = %url,
                "INSECURE is set: directory certificate verification is DISABLED (testing only)"
            );
        } else {
            debug!(url = %url, custom_ca = ca.is_some(), "Directory certificate verification enabled");
        }

        Ok(ConfiguredTransport {
            profile: TransportProfile {
                url,
                bind,
                ca,
                client_cert,
                client_key,
                insecure: tls.insecure,
                connect_timeout_secs: directory.connect_timeout_secs,
            },
            diagnostics,
        })
    }
}

/// Read one file of TLS material. Relative paths resolve against the working
/// directory.
pub(crate) async fn load_material(material: &str, path: Option<&Path>) -> MaterialLoad {
    let Some(path) = path else {
        return MaterialLoad::absent();
    };
    let resolved = resolve(path);

    match tokio::fs::read(&resolved).await {
        Ok(bytes) => {
            debug!(path = %resolved.display(), "Loaded {}", material);
            MaterialLoad {
                bytes: Some(bytes),
                diagnostic: None,
            }
        }
        Err(e) => MaterialLoad {
            bytes: None,
            diagnostic: Some(EnrolError::material_load(
                material,
                resolved.display().to_string(),
                e.to_string(),
            )),
        },
    }
}

fn resolve(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
