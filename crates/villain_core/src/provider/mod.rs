//! Locator-addressed access layer over the villain store.
//!
//! # Responsibility
//! - Classify locators into collection/item resources.
//! - Dispatch CRUD verbs to the repository and publish change signals.
//!
//! # Invariants
//! - Every mutation that reaches the store is followed by one publish.
//! - Caller errors are rejected before the store is touched.

pub mod error;
pub mod notifier;
pub mod uri;
pub mod villain_provider;
