//! Collecting `.proto` files from Go modules and git repositories.
//!
//! - **Matching and copying**: glob patterns over a source tree ([`copier`])
//! - **Git cache**: persistent clones under `~/.protovend/git` ([`git`])
//! - **Modules**: build-list resolution through the `go` command ([`modules`])
//! - **Vendoring**: the `ensure` pipeline tying them together ([`vendor`])

pub mod copier;
pub mod git;
pub mod modules;
pub mod vendor;

pub use copier::{
    DEFAULT_VENDOR_DIR, FileCopier, FsCopier, PROTO_MATCH_PATTERN, copy_file, find_matches,
    is_skipped,
};
pub use git::{
    CACHE_DIR_ENV, CheckoutOutcome, Credentials, DISABLE_HARD_RESET_ENV, GitCache,
    GitCacheConfig, GitRef, default_cache_root, repo_identity,
};
pub use modules::{
    GoToolchain, ModuleInfo, ModuleResolver, ModuleSource, ResolvedModule, module_cache_path,
    parse_module_list, read_module_name,
};
pub use vendor::{SourceKind, VendorEngine, VendorManifest, VendoredSource};
