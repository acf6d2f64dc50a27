//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    /// Human-readable entity kind used in log entries (e.g. `"task"`).
    const KIND: &'static str;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Optional slug; entities without one are identified by id.
    fn slug(&self) -> Option<&str> {
        None
    }

    /// External identifier: the slug if present, else the id.
    fn external_id(&self) -> String {
        match self.slug() {
            Some(slug) => slug.to_string(),
            None => self.id().to_string(),
        }
    }
}
