//! `bottega-state` — in-memory domain state over the persistent store.
//!
//! The console keeps the full order list in memory and re-persists it on
//! every mutation. The container takes the store by injection: nothing here
//! touches globals, and two containers over two stores stay independent.

pub mod book;
pub mod change;
pub mod error;

pub use book::OrderBook;
pub use change::{ChangeOp, ChangeSink, NullSink, PendingChange};
pub use error::StateError;
