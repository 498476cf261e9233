//! Local cache of git repositories.
//!
//! One working copy per remote URL lives under the cache root
//! (`~/.protovend/git` by default) and is reused across runs:
//!
//! ```text
//! absent ──clone──▶ cloned ──fetch──▶ fetched ──reset/checkout──▶ checked out
//! ```
//!
//! A run always fetches, then hard-resets the working tree (unless disabled)
//! so drift left behind by an earlier run cannot leak into the vendored files.

use anyhow::{Context, Result};
use colored::*;
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{AutotagOption, Cred, FetchOptions, Oid, RemoteCallbacks, Repository};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};

const ORIGIN: &str = "origin";
const FETCH_REFSPECS: [&str; 2] = [
    "+refs/heads/*:refs/remotes/origin/*",
    "+refs/tags/*:refs/tags/*",
];

/// Environment variable overriding the cache root.
pub const CACHE_DIR_ENV: &str = "PROTOVEND_CACHE_DIR";
/// Set to `1` to skip the hard reset before checkout.
pub const DISABLE_HARD_RESET_ENV: &str = "DISABLE_HARD_RESET";

#[derive(Debug, Clone)]
pub struct GitCacheConfig {
    pub root: PathBuf,
    pub hard_reset: bool,
    pub progress: bool,
}

impl GitCacheConfig {
    /// Defaults derived from the environment, computed once by the caller.
    pub fn from_env() -> Result<Self> {
        let root = match std::env::var_os(CACHE_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => default_cache_root()?,
        };
        let hard_reset = hard_reset_enabled(std::env::var(DISABLE_HARD_RESET_ENV).ok().as_deref());
        Ok(Self {
            root,
            hard_reset,
            progress: true,
        })
    }
}

/// Only the exact value `1` disables the reset.
fn hard_reset_enabled(disable: Option<&str>) -> bool {
    disable != Some("1")
}

pub fn default_cache_root() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".protovend").join("git"))
}

/// Which state of the repository to check out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitRef {
    Commit(String),
    Tag(String),
    /// Leave whatever HEAD resolves to after fetch and reset.
    DefaultBranch,
}

impl GitRef {
    fn describe(&self) -> String {
        match self {
            GitRef::Commit(sha) => format!("commit {}", short_hash(sha)),
            GitRef::Tag(tag) => format!("tag {}", tag),
            GitRef::DefaultBranch => "default branch".to_string(),
        }
    }
}

/// HTTP basic-auth credentials for private repositories.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("token", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    /// Working copy inside the cache.
    pub dir: PathBuf,
    /// URL with scheme and `.git` stripped, e.g. `github.com/org/repo`.
    pub identity: String,
    /// Whether this call had to clone.
    pub cloned: bool,
    /// Commit checked out, if the repository has one.
    pub head: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GitCache {
    config: GitCacheConfig,
}

impl GitCache {
    pub fn new(config: GitCacheConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.config.root).with_context(|| {
            format!(
                "Failed to create git cache directory {}",
                self.config.root.display()
            )
        })
    }

    /// Cache directory for `url` and the identity string it was derived from.
    pub fn repo_dir(&self, url: &str) -> (PathBuf, String) {
        let identity = repo_identity(url);
        (self.config.root.join(&identity), identity)
    }

    pub fn ensure_checked_out(
        &self,
        url: &str,
        git_ref: &GitRef,
        credentials: Option<&Credentials>,
    ) -> Result<CheckoutOutcome> {
        let (dir, identity) = self.repo_dir(url);

        let (repo, cloned) = if dir.exists() {
            self.status(format!("   {} Using cached: {}", "⚡".green(), identity));
            let repo = Repository::open(&dir).with_context(|| {
                format!("Failed to open cached repository {} at {}", url, dir.display())
            })?;
            (repo, false)
        } else {
            self.init()?;
            (self.clone_repo(url, &dir, credentials)?, true)
        };

        self.fetch(&repo, url, &FETCH_REFSPECS, credentials)?;

        if self.config.hard_reset {
            hard_reset(&repo).with_context(|| format!("Failed to hard reset {}", url))?;
        }

        match git_ref {
            GitRef::Commit(sha) => {
                let oid = resolve_commit(&repo, sha)
                    .with_context(|| format!("Commit {} not found in {}", sha, url))?;
                self.checkout(&repo, oid, &git_ref.describe())
                    .with_context(|| format!("Failed to checkout {} in {}", sha, url))?;
            }
            GitRef::Tag(tag) => {
                let oid = resolve_tag(&repo, tag)
                    .with_context(|| format!("Tag {} not found in {}", tag, url))?;
                self.checkout(&repo, oid, &git_ref.describe())
                    .with_context(|| format!("Failed to checkout tag {} in {}", tag, url))?;

                // Tags can be created or moved after the fetch above missed them.
                let refspec = format!("+refs/tags/{tag}:refs/tags/{tag}");
                self.fetch(&repo, url, &[refspec.as_str()], credentials)
                    .with_context(|| format!("Failed to pull tag {} from {}", tag, url))?;
                let pulled = resolve_tag(&repo, tag)?;
                if pulled != oid {
                    self.checkout(&repo, pulled, &git_ref.describe())
                        .with_context(|| format!("Failed to checkout tag {} in {}", tag, url))?;
                }
            }
            GitRef::DefaultBranch => {}
        }

        let head = repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
            .map(|commit| commit.id().to_string());

        Ok(CheckoutOutcome {
            dir,
            identity,
            cloned,
            head,
        })
    }

    fn clone_repo(
        &self,
        url: &str,
        dir: &Path,
        credentials: Option<&Credentials>,
    ) -> Result<Repository> {
        let pb = self.progress_bar(format!("Cloning {}...", url));
        let mut builder = RepoBuilder::new();
        builder.fetch_options(fetch_options(credentials, &pb));

        match builder.clone(url, dir) {
            Ok(repo) => {
                pb.finish_and_clear();
                self.status(format!("   {} Cloned {}", "✓".green(), url));
                Ok(repo)
            }
            Err(err) => {
                pb.finish_and_clear();
                Err(err).with_context(|| format!("Failed to clone {} into {}", url, dir.display()))
            }
        }
    }

    fn fetch(
        &self,
        repo: &Repository,
        url: &str,
        refspecs: &[&str],
        credentials: Option<&Credentials>,
    ) -> Result<()> {
        let pb = self.progress_bar(format!("Fetching {}...", url));
        let mut remote = repo
            .find_remote(ORIGIN)
            .with_context(|| format!("Repository for {} has no '{}' remote", url, ORIGIN))?;
        let mut options = fetch_options(credentials, &pb);
        let result = remote.fetch(refspecs, Some(&mut options), None);
        pb.finish_and_clear();
        result.with_context(|| format!("Failed to fetch {}", url))
    }

    fn checkout(&self, repo: &Repository, oid: Oid, what: &str) -> Result<()> {
        let object = repo.find_object(oid, None)?;
        let mut checkout = CheckoutBuilder::new();
        if self.config.hard_reset {
            checkout.force();
        } else {
            checkout.safe();
        }
        repo.checkout_tree(&object, Some(&mut checkout))?;
        repo.set_head_detached(oid)?;
        self.status(format!("   {} Locked to {}", "📌".blue(), what));
        Ok(())
    }

    fn status(&self, line: String) {
        if self.config.progress {
            println!("{}", line);
        }
    }

    fn progress_bar(&self, message: String) -> ProgressBar {
        if !self.config.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.blue} {msg} {pos} objects")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⣾⣽⣻⢿⡿⣟⣯⣷"),
        );
        pb.set_message(message);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Strips scheme prefixes and a trailing `.git` from a repository URL.
pub fn repo_identity(url: &str) -> String {
    let mut identity = url;
    for prefix in ["git://", "https://", "http://"] {
        identity = identity.strip_prefix(prefix).unwrap_or(identity);
    }
    identity = identity.strip_suffix(".git").unwrap_or(identity);
    identity.trim_start_matches('/').to_string()
}

fn fetch_options<'a>(
    credentials: Option<&'a Credentials>,
    pb: &'a ProgressBar,
) -> FetchOptions<'a> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.transfer_progress(move |stats| {
        pb.set_position(stats.received_objects() as u64);
        true
    });
    if let Some(creds) = credentials {
        let mut attempts = 0;
        callbacks.credentials(move |_url, _username, _allowed| {
            attempts += 1;
            if attempts > 1 {
                return Err(git2::Error::from_str("authentication rejected"));
            }
            Cred::userpass_plaintext(&creds.user, &creds.token)
        });
    }
    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    // Auto-following keeps stale local tags even under a forced refspec;
    // tags only arrive through the explicit refspecs.
    options.download_tags(AutotagOption::None);
    options
}

fn hard_reset(repo: &Repository) -> Result<()> {
    // Freshly initialised remotes have no commit to reset to.
    let Ok(head) = repo.head() else {
        return Ok(());
    };
    let commit = head.peel_to_commit()?;
    repo.reset(commit.as_object(), git2::ResetType::Hard, None)?;
    Ok(())
}

fn resolve_commit(repo: &Repository, sha: &str) -> Result<Oid> {
    let object = repo.revparse_single(sha)?;
    Ok(object.peel_to_commit()?.id())
}

fn resolve_tag(repo: &Repository, tag: &str) -> Result<Oid> {
    let reference = repo.find_reference(&format!("refs/tags/{}", tag))?;
    Ok(reference.peel_to_commit()?.id())
}

fn short_hash(rev: &str) -> &str {
    rev.get(..7).unwrap_or(rev)
}
