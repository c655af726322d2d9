//! Shared domain types for the Vigil project.

pub mod config;
pub mod frame;
pub mod lifecycle;
pub mod verdict;

mod errors;

pub use errors::{Result, VigilError};
