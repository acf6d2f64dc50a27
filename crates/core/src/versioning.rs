//! Optimistic versioning for mutable records.

use crate::error::{DomainError, DomainResult};

/// Capability: a record guarded by a monotonically increasing version counter.
///
/// Versions start at 1 on creation and grow by exactly 1 per persisted
/// mutation. Persistence collaborators compare it at write time to detect lost
/// updates.
pub trait Versioned {
    fn version(&self) -> u64;

    /// The expectation a conditional write of this snapshot must satisfy.
    ///
    /// Call this *before* mutating the snapshot.
    fn expected_version(&self) -> ExpectedVersion {
        ExpectedVersion::Exact(self.version())
    }
}

/// Optimistic concurrency expectation for a conditional write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (fixtures, migrations).
    Any,
    /// Require the stored record to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_matches_only_same_version() {
        assert!(ExpectedVersion::Exact(3).matches(3));
        assert!(!ExpectedVersion::Exact(3).matches(4));
        assert!(ExpectedVersion::Any.matches(99));
    }

    #[test]
    fn stale_check_is_a_conflict() {
        let err = ExpectedVersion::Exact(1).check(2).unwrap_err();
        assert!(err.is_conflict());
    }
}
