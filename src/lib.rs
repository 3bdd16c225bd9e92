//! gridlock — the time-overlap conflict engine behind a personal planner.
//!
//! Two layered components: a [`index::BucketIndex`] mapping fixed-width time
//! buckets to the item identifiers whose windows touch them, and a
//! [`resolver::ConflictResolver`] that uses the index as a pre-filter before
//! running an exact pairwise overlap predicate on the surviving candidates.
//!
//! The index is a rebuildable, in-memory secondary structure — never the
//! system of record. Persistence, authorization, and sharing semantics stay
//! with the host application.

pub mod index;
pub mod limits;
pub mod model;
pub mod observability;
pub mod resolver;
