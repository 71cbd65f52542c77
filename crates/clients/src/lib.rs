//! `bottega-clients` — customer records.

pub mod client;

pub use client::{Client, ClientKind, ContactInfo, LoyaltyLevel};
