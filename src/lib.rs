//! # protovend - Vendoring for `.proto` files
//!
//! protovend copies protobuf definitions out of the Go modules a project
//! depends on and out of arbitrary git repositories into one local directory,
//! laid out by import path so `protoc -I .proto_vendor` resolves them.
//!
//! ## Features
//!
//! - **Go modules**: asks the `go` command for the build list, honours `replace`
//! - **Git sources**: pinned by commit or tag, cloned once into a shared cache
//! - **Glob selection**: `**` patterns per module or repository
//! - **Patching**: rewrites `option go_package` and import paths after copying
//!
//! ## Quick Start
//!
//! ```bash
//! # Vendor according to ./protovend.toml
//! protovend ensure
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Configuration parsing (`protovend.toml`)
//! - [`deps`] - Module resolution, git cache and the vendor engine
//! - [`patch`] - Post-processing of vendored files
//! - [`commands`] - CLI command handlers

/// Git cache management.
pub mod cache;

/// CLI command handlers extracted from main.
pub mod commands;

/// Configuration file parsing (`protovend.toml`).
pub mod config;

/// Module resolution, git cache and vendoring.
pub mod deps;

/// Error kinds callers can match on.
pub mod error;

/// `go_package` and import patching.
pub mod patch;

/// Terminal UI utilities (tables, colors).
pub mod ui;
