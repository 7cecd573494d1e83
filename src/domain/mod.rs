//! Domain layer for changeward
//!
//! This module contains the core models, port traits and error types.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
