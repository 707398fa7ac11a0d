// src/utils/mod.rs
//! Common utilities: errors, configuration, stopwatch

pub mod config;
pub mod errors;
pub mod stopwatch;
