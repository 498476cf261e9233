//! Error kinds that callers (and tests) need to tell apart.
//!
//! Everything else travels as `anyhow::Error` with context attached at each
//! layer; these variants sit at the root of that chain and can be recovered
//! with `err.downcast_ref::<VendorError>()`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VendorError {
    #[error(
        "no go.mod found for {dir}\n\n💡 Tip: run protovend from the root of a Go module project"
    )]
    NoModuleManifest { dir: PathBuf },

    #[error("module manifest {path} is empty")]
    EmptyManifest { path: PathBuf },

    #[error("module manifest {path} has no `module` directive")]
    MalformedManifest { path: PathBuf },

    #[error(
        "module {module} resolved to {path}, which does not exist\n\n💡 Tip: run 'go mod download' to populate the module cache"
    )]
    ModuleDirMissing { module: String, path: PathBuf },

    #[error("`{command}` failed:\n{output}")]
    ToolchainFailed { command: String, output: String },

    #[error("invalid glob pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("{path} is not a regular file")]
    IrregularFile { path: PathBuf },

    #[error("{path} has no package or syntax statement to anchor the go_package option")]
    MissingPackageStatement { path: PathBuf },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Returns the `VendorError` at the root of an error chain, if there is one.
pub fn root_kind(err: &anyhow::Error) -> Option<&VendorError> {
    err.chain().find_map(|cause| cause.downcast_ref::<VendorError>())
}
