//! File matching and copying.
//!
//! Everything that touches the filesystem on behalf of the vendor engine goes
//! through [`FileCopier`], so the engine can be driven by a recording mock in
//! tests.

use crate::error::VendorError;
use anyhow::{Context, Result};
use colored::*;
use globset::{GlobBuilder, GlobMatcher};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Default name of the vendor output directory.
pub const DEFAULT_VENDOR_DIR: &str = ".proto_vendor";

/// Pattern used when a module is vendored without explicit patterns.
pub const PROTO_MATCH_PATTERN: &str = "**/*.proto";

pub trait FileCopier {
    /// Files under `root` matching `patterns`, in pattern order.
    fn get_matches(&self, patterns: &[String], root: &Path, skip_dirs: &[String])
    -> Result<Vec<PathBuf>>;

    /// Copies `src` to `dst`, returning the number of bytes written.
    fn copy(&self, src: &Path, dst: &Path) -> Result<u64>;
}

/// [`FileCopier`] backed by the real filesystem.
#[derive(Debug, Clone)]
pub struct FsCopier {
    skip_dirs: Vec<String>,
    verbose: bool,
}

impl FsCopier {
    /// `vendor_dir_name` is always skipped so a rerun never picks up its own output.
    pub fn new(vendor_dir_name: &str) -> Self {
        Self {
            skip_dirs: vec![vendor_dir_name.to_string()],
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn skip_dirs(&self) -> &[String] {
        &self.skip_dirs
    }
}

impl Default for FsCopier {
    fn default() -> Self {
        Self::new(DEFAULT_VENDOR_DIR)
    }
}

impl FileCopier for FsCopier {
    fn get_matches(
        &self,
        patterns: &[String],
        root: &Path,
        skip_dirs: &[String],
    ) -> Result<Vec<PathBuf>> {
        let mut all_skips = self.skip_dirs.clone();
        all_skips.extend(skip_dirs.iter().cloned());
        find_matches(patterns, root, &all_skips)
    }

    fn copy(&self, src: &Path, dst: &Path) -> Result<u64> {
        if self.verbose {
            println!("   {} {} -> {}", "+".green(), src.display(), dst.display());
        }
        copy_file(src, dst)
    }
}

/// Glob `patterns` under `root`, dropping anything below a skipped directory.
/// Directories themselves never match.
///
/// Results are grouped by pattern in the order given; a file matched by two
/// patterns appears twice.
pub fn find_matches(patterns: &[String], root: &Path, skip_dirs: &[String]) -> Result<Vec<PathBuf>> {
    let matchers = patterns
        .iter()
        .map(|pattern| compile_pattern(pattern))
        .collect::<Result<Vec<_>>>()?;

    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut candidates = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped(entry.path(), root, skip_dirs));
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if entry.file_type().is_dir() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();
        candidates.push(relative);
    }

    let mut matches = Vec::new();
    for matcher in &matchers {
        for relative in &candidates {
            if matcher.is_match(relative) {
                matches.push(root.join(relative));
            }
        }
    }
    Ok(matches)
}

/// Patterns are always relative to the match root: `./`, a leading `/` and
/// repeated separators are dropped, so `./api//*.proto` means `api/*.proto`.
fn normalize_pattern(pattern: &str) -> String {
    pattern
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn compile_pattern(pattern: &str) -> Result<GlobMatcher> {
    let glob = GlobBuilder::new(&normalize_pattern(pattern))
        .literal_separator(true)
        .build()
        .map_err(|source| VendorError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
    Ok(glob.compile_matcher())
}

/// True when a path segment below `root` equals one of `skip_dirs` exactly.
pub fn is_skipped(path: &Path, root: &Path, skip_dirs: &[String]) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().any(|component| match component {
        Component::Normal(segment) => skip_dirs.iter().any(|skip| segment == skip.as_str()),
        _ => false,
    })
}

/// Stream-copies a regular file, creating the destination's parent directories.
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
    let metadata = fs::symlink_metadata(src)
        .with_context(|| format!("Failed to stat {}", src.display()))?;
    if !metadata.file_type().is_file() {
        return Err(VendorError::IrregularFile {
            path: src.to_path_buf(),
        }
        .into());
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let mut reader =
        fs::File::open(src).with_context(|| format!("Failed to open {}", src.display()))?;
    let mut writer =
        fs::File::create(dst).with_context(|| format!("Failed to create {}", dst.display()))?;
    io::copy(&mut reader, &mut writer)
        .with_context(|| format!("Failed to copy {} -> {}", src.display(), dst.display()))
}
