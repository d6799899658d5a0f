//! HTTP handlers.
//!
//! - [`farm`]: the replay wire contract other nodes call
//! - [`admin`]: farm-wide operations restricted to administrators
//! - [`health`]: liveness and metrics

pub mod admin;
pub mod farm;
pub mod health;
