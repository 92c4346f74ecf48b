//! Enrol Directory - directory service backends
//!
//! This crate provides:
//! - `TransportConfigurator`: builds the connection profile (CA trust, client
//!   identity, insecure override) before every directory operation
//! - `LiveDirectory`: the LDAP-backed `DirectoryBackend`
//! - `Unconfigured`: the backend used when no directory is set up
//! - `DirectoryFactory`: picks one of the two from settings, per call

pub mod factory;
pub mod live;
pub mod transport;
pub mod unconfigured;

pub use factory::DirectoryFactory;
pub use live::LiveDirectory;
pub use transport::{BindCredentials, ConfiguredTransport, TransportConfigurator, TransportProfile};
pub use unconfigured::Unconfigured;
