//! Grid configuration

pub mod grid_config;

pub use grid_config::*;
