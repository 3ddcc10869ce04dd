//! API handlers for Janua.
//!
//! Routes live under `auth` (registration, login, verification, reset,
//! session), `me` (authenticated self-service), and `health`.

pub mod auth;
pub mod health;
pub mod me;
pub mod root;
