//! Enrol Core - Domain types and traits for POSIX identity provisioning

pub mod error;
pub mod ids;
pub mod ldif;
pub mod models;
pub mod traits;


pub use error::*;
pub use ids::*;
pub use ldif::*;
pub use models::*;
pub use traits::*;
