//! CLI Command handlers
//!
//! Implementation of the handlers behind `main.rs`.

pub mod ensure;
