//! Shared record metadata embedded in every managed entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity, version and audit timestamps of a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta<Id> {
    id: Id,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
    version: u64,
}

impl<Id> RecordMeta<Id> {
    pub fn new(id: Id, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created: now,
            modified: now,
            version: 1,
        }
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Record a mutation: bump the version by one and refresh `modified`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.modified = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn touch_bumps_version_and_modified() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();

        let mut meta = RecordMeta::new(7_u64, created);
        assert_eq!(meta.version(), 1);

        meta.touch(later);
        assert_eq!(meta.version(), 2);
        assert_eq!(meta.modified(), later);
        assert_eq!(meta.created(), created);
    }
}
