//! Soft activation / soft deletion shared by every managed entity.
//!
//! A lifecycle flag records its transition timestamp only when its value
//! actually flips. Setting a flag to the value it already holds is a silent
//! no-op: nothing is written and nothing is returned as an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::entity::Entity;

/// Which lifecycle flag a transition targets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleFlag {
    IsActive,
    IsDeleted,
}

impl LifecycleFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleFlag::IsActive => "is_active",
            LifecycleFlag::IsDeleted => "is_deleted",
        }
    }
}

/// A single lifecycle action and the timestamp field it records.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleTransition {
    Activated,
    Deactivated,
    Deleted,
    Undeleted,
}

impl LifecycleTransition {
    pub fn flag(self) -> LifecycleFlag {
        match self {
            Self::Activated | Self::Deactivated => LifecycleFlag::IsActive,
            Self::Deleted | Self::Undeleted => LifecycleFlag::IsDeleted,
        }
    }

    /// Value the flag holds after the transition.
    pub fn target_value(self) -> bool {
        matches!(self, Self::Activated | Self::Deleted)
    }

    /// Name of the timestamp field this transition records.
    pub fn field(self) -> &'static str {
        match self {
            Self::Activated => "activated",
            Self::Deactivated => "deactivated",
            Self::Deleted => "deleted",
            Self::Undeleted => "undeleted",
        }
    }
}

/// Active/deleted flags plus the time of their last transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleState {
    is_active: bool,
    is_deleted: bool,
    activated: Option<DateTime<Utc>>,
    deactivated: Option<DateTime<Utc>>,
    deleted: Option<DateTime<Utc>>,
    undeleted: Option<DateTime<Utc>>,
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self {
            is_active: true,
            is_deleted: false,
            activated: None,
            deactivated: None,
            deleted: None,
            undeleted: None,
        }
    }
}

impl LifecycleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn activated(&self) -> Option<DateTime<Utc>> {
        self.activated
    }

    pub fn deactivated(&self) -> Option<DateTime<Utc>> {
        self.deactivated
    }

    pub fn deleted(&self) -> Option<DateTime<Utc>> {
        self.deleted
    }

    pub fn undeleted(&self) -> Option<DateTime<Utc>> {
        self.undeleted
    }

    /// Visible to listings: active and not deleted.
    pub fn is_visible(&self) -> bool {
        self.is_active && !self.is_deleted
    }

    /// Apply a transition. Returns `true` iff the flag value changed.
    pub fn apply(&mut self, transition: LifecycleTransition, now: DateTime<Utc>) -> bool {
        let value = transition.target_value();
        let flag = match transition.flag() {
            LifecycleFlag::IsActive => &mut self.is_active,
            LifecycleFlag::IsDeleted => &mut self.is_deleted,
        };

        if *flag == value {
            return false;
        }
        *flag = value;

        let stamp = match transition {
            LifecycleTransition::Activated => &mut self.activated,
            LifecycleTransition::Deactivated => &mut self.deactivated,
            LifecycleTransition::Deleted => &mut self.deleted,
            LifecycleTransition::Undeleted => &mut self.undeleted,
        };
        *stamp = Some(now);
        true
    }

    pub fn activate(&mut self, now: DateTime<Utc>) -> bool {
        self.apply(LifecycleTransition::Activated, now)
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) -> bool {
        self.apply(LifecycleTransition::Deactivated, now)
    }

    pub fn delete(&mut self, now: DateTime<Utc>) -> bool {
        self.apply(LifecycleTransition::Deleted, now)
    }

    pub fn undelete(&mut self, now: DateTime<Utc>) -> bool {
        self.apply(LifecycleTransition::Undeleted, now)
    }
}

/// Query predicate over lifecycle flags handed to persistence collaborators.
///
/// `None` means "don't care" for that flag.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LifecyclePredicate {
    pub is_active: Option<bool>,
    pub is_deleted: Option<bool>,
}

impl LifecyclePredicate {
    /// Match every record regardless of lifecycle flags.
    pub fn any() -> Self {
        Self::default()
    }

    /// `is_active = true AND is_deleted = false`.
    pub fn active() -> Self {
        Self {
            is_active: Some(true),
            is_deleted: Some(false),
        }
    }

    pub fn matches(&self, state: &LifecycleState) -> bool {
        self.is_active.is_none_or(|v| v == state.is_active)
            && self.is_deleted.is_none_or(|v| v == state.is_deleted)
    }
}

/// Shorthand for [`LifecyclePredicate::active`].
pub fn active_clauses() -> LifecyclePredicate {
    LifecyclePredicate::active()
}

/// Capability: an entity carrying a [`LifecycleState`].
///
/// The provided transition methods apply the change, log it, and let the
/// entity record the mutation (version bump) when something actually changed.
pub trait LifecycleManaged: Entity {
    fn lifecycle(&self) -> &LifecycleState;

    fn lifecycle_mut(&mut self) -> &mut LifecycleState;

    /// Called once per effective transition, after the flag has flipped.
    fn on_lifecycle_change(&mut self, now: DateTime<Utc>);

    fn transition(&mut self, transition: LifecycleTransition, now: DateTime<Utc>) -> bool {
        let changed = self.lifecycle_mut().apply(transition, now);
        let flag = transition.flag().as_str();
        let field = transition.field();

        if changed {
            self.on_lifecycle_change(now);
            debug!(
                entity = Self::KIND,
                identifier = %self.external_id(),
                flag,
                field,
                at = %now,
                "lifecycle transition"
            );
        } else {
            trace!(
                entity = Self::KIND,
                identifier = %self.external_id(),
                flag,
                "lifecycle flag already set; no-op"
            );
        }
        changed
    }

    fn activate(&mut self, now: DateTime<Utc>) -> bool {
        self.transition(LifecycleTransition::Activated, now)
    }

    fn deactivate(&mut self, now: DateTime<Utc>) -> bool {
        self.transition(LifecycleTransition::Deactivated, now)
    }

    fn delete(&mut self, now: DateTime<Utc>) -> bool {
        self.transition(LifecycleTransition::Deleted, now)
    }

    fn undelete(&mut self, now: DateTime<Utc>) -> bool {
        self.transition(LifecycleTransition::Undeleted, now)
    }
}
