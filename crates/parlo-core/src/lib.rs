//! Core types, config, and errors for parlo.

pub mod config;
pub mod error;
pub mod types;

pub use error::{ParloError, Result};
