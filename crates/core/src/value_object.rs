//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity. Two instances with the same attribute
/// values are the same value (a `Grade::B` is a `Grade::B` wherever it comes
/// from), and they are never mutated in place: to "change" one, build a new one.
///
/// Compare with [`crate::Entity`], where identity matters more than content.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
