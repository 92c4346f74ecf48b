//! Numeric identifier allocation
//!
//! The next id is one past the highest id already in use, looking at both the
//! directory and the local record store on every call. The two can diverge
//! (a directory write that succeeded once and failed another time), so
//! neither is trusted alone. Values outside the configured range are ignored.
//! Ids are never reused: exhaustion is reached when the highest taken id is
//! the last of the range, regardless of gaps below it.

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use enrol_core::{
    AllocationRange, AllocationSettings, DirectoryBackend, EnrolError, EntryKind, GidNumber,
    IdClass, RecordStore, Result, UidNumber,
};

/// Running highest in-range id
#[derive(Debug, Clone, Copy)]
struct Highest {
    range: AllocationRange,
    value: Option<u32>,
}

impl Highest {
    fn new(range: AllocationRange) -> Self {
        Self { range, value: None }
    }

    fn fold(&mut self, candidate: u32) {
        if !self.range.contains(candidate) {
            return;
        }
        self.value = Some(self.value.map_or(candidate, |v| v.max(candidate)));
    }

    fn next(self, class: IdClass) -> Result<u32> {
        let next = match self.value {
            Some(v) => v + 1,
            None => self.range.start,
        };
        if next >= self.range.max {
            return Err(EnrolError::RangeExhausted {
                class,
                start: self.range.start,
                max: self.range.max,
            });
        }
        Ok(next)
    }
}

/// Computes the next free uid or gid
pub struct IdAllocator<S: RecordStore> {
    ranges: AllocationSettings,
    store: Arc<S>,
}

impl<S: RecordStore> IdAllocator<S> {
    pub fn new(ranges: AllocationSettings, store: Arc<S>) -> Self {
        Self { ranges, store }
    }

    /// Next free id of `class`, scanning `directory` and the local store
    #[instrument(skip(self, directory), fields(backend = directory.name()))]
    pub async fn allocate(&self, directory: &dyn DirectoryBackend, class: IdClass) -> Result<u32> {
        let mut highest = Highest::new(self.ranges.range(class));

        self.scan_directory(directory, class, &mut highest).await;
        self.scan_local(class, &mut highest).await?;

        let next = highest.next(class)?;
        debug!(%class, next, "Allocated identifier");
        Ok(next)
    }

    pub async fn next_uid(&self, directory: &dyn DirectoryBackend) -> Result<UidNumber> {
        self.allocate(directory, IdClass::User).await.map(UidNumber::new)
    }

    pub async fn next_gid(&self, directory: &dyn DirectoryBackend) -> Result<GidNumber> {
        self.allocate(directory, IdClass::Group).await.map(GidNumber::new)
    }

    async fn scan_directory(
        &self,
        directory: &dyn DirectoryBackend,
        class: IdClass,
        highest: &mut Highest,
    ) {
        // An account's primary gid consumes the group range as well.
        match directory.search_accounts().await {
            Ok(accounts) => {
                for account in &accounts {
                    match class {
                        IdClass::User => highest.fold(account.record.uid_number.get()),
                        IdClass::Group => highest.fold(account.record.gid_number.get()),
                    }
                }
            }
            Err(e) => log_directory_skip(&e),
        }

        if class == IdClass::Group {
            match directory.search_groups().await {
                Ok(groups) => {
                    for group in &groups {
                        highest.fold(group.record.gid.get());
                    }
                }
                Err(e) => log_directory_skip(&e),
            }
        }
    }

    async fn scan_local(&self, class: IdClass, highest: &mut Highest) -> Result<()> {
        let accounts = self.store.read_deferred(EntryKind::Account).await?;

        match class {
            IdClass::User => {
                for entry in &accounts {
                    if let Some(uid) = entry.number("uidnumber") {
                        highest.fold(uid);
                    }
                }
            }
            IdClass::Group => {
                for group in self.store.read_groups().await? {
                    highest.fold(group.gid.get());
                }
                for entry in self.store.read_deferred(EntryKind::Group).await? {
                    if let Some(gid) = entry.number("gidnumber") {
                        highest.fold(gid);
                    }
                }
                for entry in &accounts {
                    if let Some(gid) = entry.number("gidnumber") {
                        highest.fold(gid);
                    }
                }
            }
        }
        Ok(())
    }
}

fn log_directory_skip(e: &EnrolError) {
    match e {
        EnrolError::DirectoryUnavailable => {
            debug!("No directory configured, allocating from local records only")
        }
        other => warn!(
            "Directory scan failed, allocating from local records only: {}",
            other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u32, max: u32) -> AllocationRange {
        AllocationRange::new(start, max).unwrap()
    }

    #[test]
    fn test_empty_range_starts_at_start() {
        let highest = Highest::new(range(3000, 4000));
        assert_eq!(highest.next(IdClass::User).unwrap(), 3000);
    }

    #[test]
    fn test_out_of_range_values_are_ignored() {
        let mut highest = Highest::new(range(3000, 4000));
        highest.fold(1000);
        highest.fold(4000);
        highest.fold(65534);
        assert_eq!(highest.next(IdClass::User).unwrap(), 3000);

        highest.fold(3007);
        highest.fold(3002);
        assert_eq!(highest.next(IdClass::User).unwrap(), 3008);
    }

    #[test]
    fn test_exhausted_when_top_is_taken() {
        let mut highest = Highest::new(range(10, 12));
        highest.fold(10);
        assert_eq!(highest.next(IdClass::Group).unwrap(), 11);

        highest.fold(11);
        assert!(matches!(
            highest.next(IdClass::Group),
            Err(EnrolError::RangeExhausted {
                class: IdClass::Group,
                start: 10,
                max: 12
            })
        ));
    }

    #[test]
    fn test_range_starting_at_zero() {
        let highest = Highest::new(range(0, 1));
        assert_eq!(highest.next(IdClass::User).unwrap(), 0);
    }
}
