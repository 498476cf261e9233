//! Git cache management.
//!
//! Repositories are cloned once into `~/.protovend/git/{identity}` (or
//! `$PROTOVEND_CACHE_DIR`) and reused by every project on the machine.
//!
//! ## Commands
//!
//! - `protovend cache path` - Print cache directory location
//! - `protovend cache ls` - List cached repositories
//! - `protovend cache clean` - Remove every cached repository

use crate::ui;
use anyhow::{Context, Result};
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn print_path(root: &Path) -> Result<()> {
    println!("{}", root.display());
    Ok(())
}

/// Identities of every repository below `root`, sorted.
///
/// A repository is a directory holding `.git`; its identity is the path
/// relative to `root` with `/` separators.
pub fn cached_repositories(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut repos = Vec::new();
    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name().into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.with_context(|| format!("Failed to read {}", root.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if entry.path().join(".git").exists() {
            let identity = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/");
            repos.push((identity, entry.path().to_path_buf()));
            walker.skip_current_dir();
        }
    }
    Ok(repos)
}

pub fn list(root: &Path) -> Result<()> {
    let repos = cached_repositories(root)?;
    if repos.is_empty() {
        println!("{} Cache is empty.", "ℹ".blue());
        return Ok(());
    }

    let mut table = ui::Table::new(&["Cached Repository", "HEAD"]);
    for (identity, dir) in &repos {
        table.add_row(vec![identity.clone(), head_of(dir)]);
    }
    table.print();
    Ok(())
}

fn head_of(dir: &Path) -> String {
    git2::Repository::open(dir)
        .ok()
        .and_then(|repo| {
            let commit = repo.head().ok()?.peel_to_commit().ok()?;
            Some(commit.id().to_string().chars().take(7).collect())
        })
        .unwrap_or_else(|| "-".to_string())
}

pub fn clean(root: &Path) -> Result<()> {
    if root.exists() {
        println!("{} Cleaning cache...", "🧹".yellow());
        fs::remove_dir_all(root)
            .with_context(|| format!("Failed to remove {}", root.display()))?;
        fs::create_dir_all(root)
            .with_context(|| format!("Failed to recreate {}", root.display()))?;
        println!("{} Cache cleaned.", "✓".green());
    } else {
        println!("{} Cache already empty.", "✓".green());
    }
    Ok(())
}
