//! # Flood Core
//!
//! The decision layer of flood control.
//! This crate holds the per-identity window logic and the ports a counter
//! store must implement; it has no network dependencies of its own.

pub mod clock;
pub mod controller;
pub mod domain;
pub mod error;
pub mod ports;

pub use controller::FloodController;
pub use error::{FloodError, StoreError};
