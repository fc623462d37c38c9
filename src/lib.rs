//! termin — hall-booking conflict engine.
//!
//! Owners publish availability windows for their halls; players request
//! appointments against them. The engine computes free bookable time,
//! validates requests and owner decisions against overlap rules, and keeps
//! the invariant that no two approved appointments of one hall overlap.
//! State is held in memory behind per-hall write locks and made durable
//! through an append-only WAL; committed events fan out to subscribers
//! (mail senders, review gating, reporting) after the fact.
//!
//! HTTP handlers, identity management and notification delivery are the
//! embedding service's business — they call in with an [`model::Actor`]
//! and react to [`notify::NotifyHub`] events.

pub mod calendar;
pub mod clock;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod wal;

pub use engine::{Engine, EngineError};
