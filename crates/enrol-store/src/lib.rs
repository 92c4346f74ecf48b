//! Local record store for Enrol
//!
//! Standby mirror of group records and landing zone for deferred-import
//! entries written when the directory cannot be reached.

pub mod file;

pub use file::FileRecordStore;
