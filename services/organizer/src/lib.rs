//! services/organizer/src/lib.rs
//!
//! The organizer service: adapters for the shared document store, the live
//! synchronization session, and the HTTP/WebSocket surface on top of it.

pub mod adapters;
pub mod config;
pub mod error;
pub mod sync;
pub mod web;
