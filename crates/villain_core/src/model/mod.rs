//! Villain domain model.
//!
//! # Responsibility
//! - Define the single persisted record shape and its column identifiers.
//! - Define the typed write payload accepted by the provider layer.
//!
//! # Invariants
//! - A villain with `id == 0` is unsaved and never maps to a stored row.
//! - Records are value objects; updates replace the full row at an id.

pub mod villain;
