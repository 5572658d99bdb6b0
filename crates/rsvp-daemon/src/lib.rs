//! rsvp-daemon library target.
//!
//! Exposes the router, state, command handling and wiring for integration
//! tests and for the operator CLI. The binary `main.rs` depends on it.

pub mod api_types;
pub mod commands;
pub mod routes;
pub mod state;
pub mod wiring;
