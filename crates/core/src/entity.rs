//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Used for records that are written once and never evolve through commands
/// (e.g. issued sales documents).
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
