//! # protovend CLI Entry Point
//!
//! Parses CLI arguments using clap and routes commands to their handlers.
//!
//! ## Command Structure
//!
//! - **Vendoring**: `ensure`
//! - **Cache**: `cache path`, `cache ls`, `cache clean`
//! - **Shell**: `completion`

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::path::PathBuf;

use protovend::cache;
use protovend::commands::ensure::{EnsureOptions, run_ensure};
use protovend::config::DEFAULT_CONFIG_FILE;
use protovend::deps::GitCacheConfig;

#[cfg(windows)]
#[link(name = "kernel32")]
unsafe extern "system" {
    fn SetConsoleOutputCP(wCodePageID: u32) -> i32;
}

/// Status glyphs need a UTF-8 console on Windows.
#[cfg(windows)]
fn enable_utf8_console() {
    unsafe {
        SetConsoleOutputCP(65001);
    }
}

#[cfg(not(windows))]
fn enable_utf8_console() {}

#[derive(Parser)]
#[command(name = "protovend")]
#[command(about = "Vendor .proto files from Go modules and git repositories", version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file
    #[arg(short = 'f', long = "file", global = true, default_value = DEFAULT_CONFIG_FILE)]
    file: PathBuf,
    /// Run as if started in this directory
    #[arg(short = 'C', long = "dir", global = true, default_value = ".")]
    dir: PathBuf,
    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Vendor every configured source into the vendor directory
    #[command(visible_alias = "e")]
    Ensure {
        /// Vendor directory, overriding the config file
        #[arg(long)]
        vendor_dir: Option<String>,
        /// Keep local changes in cached repositories (same as DISABLE_HARD_RESET=1)
        #[arg(long)]
        no_hard_reset: bool,
        /// List every copied file
        #[arg(short, long)]
        verbose: bool,
    },
    /// Manage the git repository cache
    Cache {
        #[command(subcommand)]
        op: CacheOp,
    },
    /// Generate shell completion scripts
    Completion { shell: Shell },
}

#[derive(Subcommand)]
enum CacheOp {
    /// Remove every cached repository
    Clean,
    /// List cached repositories
    Ls,
    /// Print cache directory path
    Path,
}

fn main() -> Result<()> {
    enable_utf8_console();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Ensure {
            vendor_dir,
            no_hard_reset,
            verbose,
        } => {
            let opts = EnsureOptions {
                config_path: cli.file.clone(),
                work_dir: cli.dir.clone(),
                vendor_dir: vendor_dir.clone(),
                no_hard_reset: *no_hard_reset,
                quiet: cli.quiet,
                verbose: *verbose,
            };
            run_ensure(&opts).map(|_| ())
        }
        Commands::Cache { op } => {
            let root = GitCacheConfig::from_env()?.root;
            match op {
                CacheOp::Clean => cache::clean(&root),
                CacheOp::Ls => cache::list(&root),
                CacheOp::Path => cache::print_path(&root),
            }
        }
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
            Ok(())
        }
    }
}
