//! Entity trait: identity + continuity across status changes.

/// Entity marker + minimal interface.
///
/// Exceptions, approval requests and invoices are entities: their status may
/// move along a transition table but their identity never changes.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
