//! `bottega-mockapi` — in-process mock backend.
//!
//! The original deployment served a handful of simulated endpoints next to
//! the real API (dashboard figures, low-stock queries, WhatsApp status) with
//! no real backing store. This crate reproduces that: an axum router over an
//! in-memory state, with a functioning login + bearer check so the client
//! stack can be exercised end to end in tests.

pub mod app;
pub mod state;

pub use app::{build_app, serve};
pub use state::MockState;
