//! Pure utility functions.
//!
//! Stateless helpers shared by the storage backends and consuming binaries.

pub mod bootstrap;
pub mod retry;
