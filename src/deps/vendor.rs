//! Vendoring of matched files into the local vendor directory.
//!
//! Every copied file lands at
//! `{vendor_dir}/{module import path or repo identity}/{path inside the source}`,
//! so tooling can resolve vendored imports exactly like the upstream files.
//!
//! ## Usage
//!
//! ```bash
//! protovend ensure  # resolves modules, syncs git repos, copies into ./.proto_vendor
//! ```

use super::copier::{FileCopier, PROTO_MATCH_PATTERN};
use super::git::GitCache;
use super::modules::{ModuleResolver, ModuleSource, ResolvedModule, selects};
use crate::config::{GitRepository, VendorConfig};
use anyhow::{Context, Result};
use colored::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Directories never worth matching inside a git working copy.
const GIT_SKIP_DIRS: [&str; 1] = [".git"];

/// Where a vendored source came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Module { version: String, is_main: bool },
    Git { url: String, head: Option<String> },
}

#[derive(Debug, Clone)]
pub struct VendoredSource {
    /// Module import path or repository identity.
    pub identity: String,
    pub kind: SourceKind,
    /// `(source, destination)` pairs in copy order.
    pub files: Vec<(PathBuf, PathBuf)>,
}

/// Everything one `ensure` run copied.
#[derive(Debug, Clone, Default)]
pub struct VendorManifest {
    pub root: PathBuf,
    pub sources: Vec<VendoredSource>,
}

impl VendorManifest {
    /// Destination paths mapped to the file that was written there last.
    pub fn destinations(&self) -> BTreeMap<&Path, &Path> {
        self.sources
            .iter()
            .flat_map(|source| source.files.iter())
            .map(|(src, dst)| (dst.as_path(), src.as_path()))
            .collect()
    }

    pub fn file_count(&self) -> usize {
        self.destinations().len()
    }
}

pub struct VendorEngine<S, C> {
    vendor_root: PathBuf,
    resolver: ModuleResolver<S>,
    copier: C,
    git_cache: GitCache,
    quiet: bool,
}

impl<S: ModuleSource, C: FileCopier> VendorEngine<S, C> {
    pub fn new(
        vendor_root: impl Into<PathBuf>,
        resolver: ModuleResolver<S>,
        copier: C,
        git_cache: GitCache,
    ) -> Self {
        Self {
            vendor_root: vendor_root.into(),
            resolver,
            copier,
            git_cache,
            quiet: false,
        }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Runs the module pass (when the config asks for it) and then every git
    /// import, in config order. Stops at the first error.
    pub fn ensure(&self, config: &VendorConfig) -> Result<VendorManifest> {
        let mut manifest = VendorManifest {
            root: self.vendor_root.clone(),
            sources: Vec::new(),
        };

        if config.wants_modules() {
            self.vendor_modules(config, &mut manifest)?;
        }

        for (repo, patterns) in config.git_imports() {
            if let Some(source) = self.vendor_git(repo, patterns)? {
                manifest.sources.push(source);
            }
        }

        Ok(manifest)
    }

    fn vendor_modules(&self, config: &VendorConfig, manifest: &mut VendorManifest) -> Result<()> {
        let groups: Vec<(&String, &[String])> = config.module_imports().collect();
        let selectors: Vec<String> = groups.iter().map(|(sel, _)| (*sel).clone()).collect();
        let local_patterns = config
            .local
            .as_ref()
            .map(|local| local.patterns.clone())
            .unwrap_or_default();

        let modules = self
            .resolver
            .resolve(&selectors, config.local.is_some())
            .context("Failed to resolve Go modules")?;

        self.status(format!(
            "{} Checking {} modules...",
            "📦".blue(),
            modules.len()
        ));

        for module in &modules {
            let matches = if module.is_main {
                self.copier.get_matches(&local_patterns, &module.dir, &[])?
            } else {
                self.match_module(module, &groups)?
            };
            if matches.is_empty() {
                continue;
            }
            let files = self
                .copy_all(&module.dir, &module.import_path, &matches)
                .with_context(|| format!("Failed to vendor module {}", module.import_path))?;
            manifest.sources.push(VendoredSource {
                identity: module.import_path.clone(),
                kind: SourceKind::Module {
                    version: module.version.clone(),
                    is_main: module.is_main,
                },
                files,
            });
        }
        Ok(())
    }

    /// Files to vendor from a dependency module.
    ///
    /// Groups are tried in order and the last group whose selector matches
    /// the module decides the result; earlier matching groups are discarded,
    /// not merged.
    fn match_module(
        &self,
        module: &ResolvedModule,
        groups: &[(&String, &[String])],
    ) -> Result<Vec<PathBuf>> {
        if groups.is_empty() {
            return self
                .copier
                .get_matches(&[PROTO_MATCH_PATTERN.to_string()], &module.dir, &[]);
        }

        let mut matches = Vec::new();
        for (selector, patterns) in groups {
            if !selects(std::slice::from_ref(*selector), &module.import_path) {
                continue;
            }
            matches = self
                .copier
                .get_matches(patterns, &module.dir, &[])
                .with_context(|| format!("Failed to match files in {}", module.import_path))?;
        }
        Ok(matches)
    }

    fn vendor_git(&self, repo: &GitRepository, patterns: &[String]) -> Result<Option<VendoredSource>> {
        self.status(format!("{} Syncing {}...", "📦".blue(), repo.url));
        let outcome = self
            .git_cache
            .ensure_checked_out(&repo.url, &repo.git_ref, repo.credentials.as_ref())?;

        let mut skip_dirs: Vec<String> = GIT_SKIP_DIRS.iter().map(|s| s.to_string()).collect();
        skip_dirs.extend(repo.skip_dirs.iter().cloned());

        let matches = self
            .copier
            .get_matches(patterns, &outcome.dir, &skip_dirs)
            .with_context(|| format!("Failed to match files in {}", repo.url))?;
        if matches.is_empty() {
            return Ok(None);
        }

        let files = self
            .copy_all(&outcome.dir, &outcome.identity, &matches)
            .with_context(|| format!("Failed to vendor {}", repo.url))?;
        Ok(Some(VendoredSource {
            identity: outcome.identity,
            kind: SourceKind::Git {
                url: repo.url.clone(),
                head: outcome.head,
            },
            files,
        }))
    }

    fn copy_all(
        &self,
        source_root: &Path,
        identity: &str,
        matches: &[PathBuf],
    ) -> Result<Vec<(PathBuf, PathBuf)>> {
        let mut files = Vec::with_capacity(matches.len());
        for src in matches {
            let dst = destination(&self.vendor_root, identity, source_root, src);
            self.copier
                .copy(src, &dst)
                .with_context(|| format!("Unable to copy file {}", src.display()))?;
            files.push((src.clone(), dst));
        }
        Ok(files)
    }

    fn status(&self, line: String) {
        if !self.quiet {
            println!("{}", line);
        }
    }
}

/// `{vendor_root}/{identity}/{src relative to source_root}`.
pub fn destination(vendor_root: &Path, identity: &str, source_root: &Path, src: &Path) -> PathBuf {
    let relative = src.strip_prefix(source_root).unwrap_or(src);
    let mut dst = vendor_root.to_path_buf();
    for segment in identity.split('/').filter(|s| !s.is_empty()) {
        dst.push(segment);
    }
    dst.join(relative)
}
