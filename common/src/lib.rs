//! Data model shared between the reconciliation backend and its clients.
//!
//! Nothing in this crate performs I/O. Every type serializes with camelCase
//! field names so it can be handed straight to a JSON client.

pub mod model;
pub mod requests;
