//! Core types and the cascade engine for Ruck player metrics.
//!
//! A fact recorded about a player (a missed appointment, a GPS session, an
//! injury) is pushed through a static rule graph that recomputes every
//! dependent metric exactly once, in dependency order, and reports each change.
//!
//! Nothing here performs I/O. Storage backends implement
//! [`store::CascadeStore`].

pub mod audit;
pub mod engine;
pub mod error;
pub mod fact;
pub mod graph;
pub mod metric;
pub mod rules;
pub mod snapshot;
pub mod store;

pub use error::{Error, Result};
