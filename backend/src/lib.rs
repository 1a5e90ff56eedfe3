//! Reconciles externally sourced booking and member directory exports
//! against the club's canonical member records.

pub mod config;
pub mod db;
pub mod error;
pub mod reconcile;
pub mod services;
