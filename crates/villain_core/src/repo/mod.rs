//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the villain store contract used by the provider layer.
//! - Isolate SQLite query details from dispatch/notification logic.
//!
//! # Invariants
//! - Every store operation is a single statement or a single transaction.
//! - "No row affected" is a reported count, never an error.

pub mod villain_repo;
