//! Shared foundation for the Voxling gateway crates.

pub mod config;
pub mod error;
pub mod names;
pub mod persona;
pub mod protocol;

pub use error::{Result, VoxlingError};
