//! Catalog service client contracts and in-memory implementations.
//!
//! The real Genre/Author/Book services live behind REST; the saga core
//! only depends on these traits. The in-memory implementations double as
//! test stand-ins and as the write side of the outbox flow: every
//! mutation records its domain event in the service's own outbox store
//! within the same lock scope as the state change.

pub mod author;
pub mod book;
pub mod genre;
