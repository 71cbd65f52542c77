//! `bottega-orders` — order intake domain types.
//!
//! **Responsibility:** the `Order` record and its status lifecycle.
//!
//! Orders are never hard-deleted: cancellation is a status transition, so
//! history survives for reporting and sync reconciliation.

pub mod order;

pub use order::{Order, OrderLine, OrderStatus};
