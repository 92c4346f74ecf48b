//! Enrol Provisioning - POSIX account and group provisioning
//!
//! This crate provides:
//! - `IdAllocator`: next free uid/gid across directory and local store
//! - `derive_login`: login names from first and last name
//! - `hash_password`: `{SSHA}` credential digests
//! - `Provisioner`: group-then-account creation with local fallback, plus
//!   account maintenance
//! - `Reconciler`: directory-first listings merged with local records

pub mod admin;
pub mod allocator;
pub mod credential;
pub mod login;
pub mod query;
pub mod workflow;


pub use allocator::IdAllocator;
pub use credential::hash_password;
pub use login::derive_login;
pub use query::Reconciler;
pub use workflow::Provisioner;
