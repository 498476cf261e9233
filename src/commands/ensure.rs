//! Ensure command handler
//!
//! Handles `protovend ensure`: vendor everything the config asks for, then
//! patch the vendored files.

use anyhow::{Context, Result};
use colored::*;
use std::path::PathBuf;

use crate::config::{VendorConfig, load_config};
use crate::deps::{
    FsCopier, GitCache, GitCacheConfig, GoToolchain, ModuleResolver, SourceKind, VendorEngine,
    VendorManifest,
};
use crate::patch::ProtoFilePatcher;
use crate::ui;

#[derive(Debug, Clone)]
pub struct EnsureOptions {
    /// Config file; relative paths are resolved against `work_dir`.
    pub config_path: PathBuf,
    pub work_dir: PathBuf,
    pub vendor_dir: Option<String>,
    pub no_hard_reset: bool,
    pub quiet: bool,
    pub verbose: bool,
}

/// Run the `protovend ensure` command
pub fn run_ensure(opts: &EnsureOptions) -> Result<VendorManifest> {
    let config = load(opts)?;
    let vendor_root = opts.work_dir.join(&config.vendor_dir);

    let mut git_config = GitCacheConfig::from_env()?;
    if opts.no_hard_reset {
        git_config.hard_reset = false;
    }
    git_config.progress = !opts.quiet;

    let resolver = ModuleResolver::new(GoToolchain::new(&opts.work_dir), &opts.work_dir);
    let copier = FsCopier::new(&config.vendor_dir_name()).verbose(opts.verbose && !opts.quiet);
    let engine = VendorEngine::new(&vendor_root, resolver, copier, GitCache::new(git_config))
        .quiet(opts.quiet);

    let manifest = engine.ensure(&config)?;

    if let Some(patch) = &config.patch {
        let patched = ProtoFilePatcher::from_config(&vendor_root, patch)
            .patch_all()
            .with_context(|| format!("Failed to patch files in {}", vendor_root.display()))?;
        if !opts.quiet {
            println!("{} Patched {} files", "✓".green(), patched);
        }
    }

    if !opts.quiet {
        print_summary(&manifest);
    }
    Ok(manifest)
}

fn load(opts: &EnsureOptions) -> Result<VendorConfig> {
    let path = opts.work_dir.join(&opts.config_path);
    let config = load_config(&path)?;
    match &opts.vendor_dir {
        Some(dir) => config.with_vendor_dir(dir),
        None => Ok(config),
    }
}

fn print_summary(manifest: &VendorManifest) {
    if manifest.sources.is_empty() {
        println!("{} Nothing matched, no files vendored.", "!".yellow());
        return;
    }

    let mut table = ui::Table::new(&["Source", "Revision", "Files"]);
    for source in &manifest.sources {
        let revision = match &source.kind {
            SourceKind::Module { is_main: true, .. } => "(local)".to_string(),
            SourceKind::Module { version, .. } => version.clone(),
            SourceKind::Git { head: Some(head), .. } => head.chars().take(7).collect(),
            SourceKind::Git { head: None, .. } => "-".to_string(),
        };
        table.add_row(vec![
            source.identity.clone(),
            revision,
            source.files.len().to_string(),
        ]);
    }
    table.print();
    println!(
        "{} Vendored {} files into {}",
        "✓".green(),
        manifest.file_count(),
        manifest.root.display()
    );
}
