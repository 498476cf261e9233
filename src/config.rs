//! Configuration file parsing (`protovend.toml`).
//!
//! ```toml
//! vendor_dir = ".proto_vendor"
//!
//! [local]
//! patterns = ["api/**/*.proto"]
//!
//! [[imports]]
//! module = "github.com/envoyproxy/protoc-gen-validate"
//! patterns = ["validate/*.proto"]
//!
//! [[imports]]
//! patterns = ["README.md"]
//! [imports.git]
//! url = "https://github.com/kelseyhightower/nocode"
//! sha = "6c073b08f7987018cbb2cb9a5747c84913b3608e"
//! ```

use crate::deps::{Credentials, DEFAULT_VENDOR_DIR, GitRef, PROTO_MATCH_PATTERN, repo_identity};
use crate::error::VendorError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "protovend.toml";

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct VendorConfig {
    #[serde(default = "default_vendor_dir")]
    pub vendor_dir: String,
    pub local: Option<LocalConfig>,
    #[serde(default)]
    pub imports: Vec<ImportSpec>,
    pub patch: Option<PatchConfig>,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            vendor_dir: default_vendor_dir(),
            local: None,
            imports: Vec::new(),
            patch: None,
        }
    }
}

/// Patterns matched against the project's own module.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LocalConfig {
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// One thing to vendor: glob patterns plus where to look.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "RawImportSpec")]
pub struct ImportSpec {
    pub patterns: Vec<String>,
    pub source: ImportSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportSource {
    /// Substring matched against resolved module import paths.
    Module(String),
    Git(GitRepository),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GitRepository {
    pub url: String,
    pub git_ref: GitRef,
    pub credentials: Option<Credentials>,
    pub skip_dirs: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawImportSpec {
    #[serde(default)]
    patterns: Vec<String>,
    module: Option<String>,
    git: Option<RawGitRepository>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGitRepository {
    url: String,
    sha: Option<String>,
    tag: Option<String>,
    auth_user: Option<String>,
    auth_token: Option<String>,
    auth_token_env: Option<String>,
    #[serde(default)]
    skip_dirs: Vec<String>,
}

impl TryFrom<RawImportSpec> for ImportSpec {
    type Error = VendorError;

    fn try_from(raw: RawImportSpec) -> Result<Self, Self::Error> {
        let source = match (raw.module, raw.git) {
            (Some(module), None) => ImportSource::Module(module),
            (None, Some(git)) => ImportSource::Git(GitRepository::try_from(git)?),
            (Some(_), Some(_)) => {
                return Err(VendorError::InvalidConfig(
                    "an import may set either `module` or `git`, not both".to_string(),
                ));
            }
            (None, None) => {
                return Err(VendorError::InvalidConfig(
                    "an import must set `module` or `git`".to_string(),
                ));
            }
        };

        let patterns = match (&source, raw.patterns.is_empty()) {
            // A bare module selector vendors its protos.
            (ImportSource::Module(_), true) => vec![PROTO_MATCH_PATTERN.to_string()],
            (ImportSource::Git(repo), true) => {
                return Err(VendorError::InvalidConfig(format!(
                    "git import {} has no patterns",
                    repo.url
                )));
            }
            (_, false) => raw.patterns,
        };

        Ok(ImportSpec { patterns, source })
    }
}

impl TryFrom<RawGitRepository> for GitRepository {
    type Error = VendorError;

    fn try_from(raw: RawGitRepository) -> Result<Self, Self::Error> {
        if raw.url.trim().is_empty() {
            return Err(VendorError::InvalidConfig(
                "git import has an empty url".to_string(),
            ));
        }
        // The identity names both the cache dir and the vendor subdirectory.
        if repo_identity(&raw.url).split('/').any(|segment| segment == "..") {
            return Err(VendorError::InvalidConfig(format!(
                "git import {} must not contain '..' path segments",
                raw.url
            )));
        }

        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let git_ref = match (non_empty(raw.sha), non_empty(raw.tag)) {
            (Some(_), Some(_)) => {
                return Err(VendorError::InvalidConfig(format!(
                    "git import {} sets both `sha` and `tag`; provide only one",
                    raw.url
                )));
            }
            (Some(sha), None) => GitRef::Commit(sha),
            (None, Some(tag)) => GitRef::Tag(tag),
            (None, None) => GitRef::DefaultBranch,
        };

        let token = match (non_empty(raw.auth_token), non_empty(raw.auth_token_env)) {
            (Some(token), _) => Some(token),
            (None, Some(var)) => std::env::var(&var).ok().filter(|t| !t.is_empty()),
            (None, None) => None,
        };
        let credentials = token.map(|token| Credentials {
            user: raw.auth_user.unwrap_or_default(),
            token,
        });

        Ok(GitRepository {
            url: raw.url,
            git_ref,
            credentials,
            skip_dirs: raw.skip_dirs,
        })
    }
}

/// Post-processing of vendored `.proto` files.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PatchConfig {
    #[serde(default = "default_patch_patterns")]
    pub patterns: Vec<String>,
    /// `option go_package` becomes `{prefix}/{directory of the file}`.
    pub go_package_prefix: Option<String>,
    #[serde(default)]
    pub imports: Vec<ImportRewrite>,
}

/// Replaces the `from` prefix of an import path with `to`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ImportRewrite {
    pub from: String,
    pub to: String,
}

fn default_vendor_dir() -> String {
    DEFAULT_VENDOR_DIR.to_string()
}

fn default_patch_patterns() -> Vec<String> {
    vec![PROTO_MATCH_PATTERN.to_string()]
}

impl VendorConfig {
    pub fn parse(content: &str) -> Result<Self> {
        let config: VendorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Replaces the configured vendor directory, e.g. from `--vendor-dir`.
    pub fn with_vendor_dir(mut self, dir: &str) -> Result<Self> {
        self.vendor_dir = dir.to_string();
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), VendorError> {
        let dir = self.vendor_dir.trim();
        if dir.is_empty() || dir == "." || dir == ".." {
            return Err(VendorError::InvalidConfig(format!(
                "vendor_dir '{}' must name a directory",
                self.vendor_dir
            )));
        }
        Ok(())
    }

    /// Final path segment of the vendor directory, always skipped when matching.
    pub fn vendor_dir_name(&self) -> String {
        Path::new(&self.vendor_dir)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.vendor_dir.clone())
    }

    pub fn module_imports(&self) -> impl Iterator<Item = (&String, &[String])> {
        self.imports.iter().filter_map(|spec| match &spec.source {
            ImportSource::Module(selector) => Some((selector, spec.patterns.as_slice())),
            ImportSource::Git(_) => None,
        })
    }

    pub fn git_imports(&self) -> impl Iterator<Item = (&GitRepository, &[String])> {
        self.imports.iter().filter_map(|spec| match &spec.source {
            ImportSource::Git(repo) => Some((repo, spec.patterns.as_slice())),
            ImportSource::Module(_) => None,
        })
    }

    /// Whether the Go module pass should run at all.
    ///
    /// A config without any import vendors every dependency's protos.
    pub fn wants_modules(&self) -> bool {
        self.imports.is_empty()
            || self.local.is_some()
            || self.module_imports().next().is_some()
    }
}

pub fn load_config(path: &Path) -> Result<VendorConfig> {
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "{} not found.\n\n\
            💡 Tip: create one with an [[imports]] entry, or pass --file <path>.",
            path.display()
        ));
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} - check file permissions", path.display()))?;
    VendorConfig::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::root_kind;

    #[test]
    fn test_parse_full_config() {
        let config = VendorConfig::parse(
            r#"
vendor_dir = "third_party/protos"

[local]
patterns = ["api/**/*.proto"]

[[imports]]
module = "github.com/envoyproxy/protoc-gen-validate"
patterns = ["validate/*.proto"]

[[imports]]
patterns = ["README.md"]
[imports.git]
url = "https://github.com/kelseyhightower/nocode"
sha = "6c073b08f7987018cbb2cb9a5747c84913b3608e"
skip_dirs = ["testdata"]

[patch]
go_package_prefix = "github.com/acme/app/vendor"
[[patch.imports]]
from = "validate/"
to = "github.com/envoyproxy/protoc-gen-validate/validate/"
"#,
        )
        .unwrap();

        assert_eq!(config.vendor_dir, "third_party/protos");
        assert_eq!(config.vendor_dir_name(), "protos");
        assert_eq!(config.local.as_ref().unwrap().patterns, vec!["api/**/*.proto"]);
        assert_eq!(config.imports.len(), 2);
        assert_eq!(
            config.imports[0].source,
            ImportSource::Module("github.com/envoyproxy/protoc-gen-validate".into())
        );

        let (repo, patterns) = config.git_imports().next().unwrap();
        assert_eq!(patterns, ["README.md".to_string()]);
        assert_eq!(
            repo.git_ref,
            GitRef::Commit("6c073b08f7987018cbb2cb9a5747c84913b3608e".into())
        );
        assert_eq!(repo.skip_dirs, vec!["testdata"]);
        assert!(repo.credentials.is_none());

        let patch = config.patch.unwrap();
        assert_eq!(patch.patterns, vec![PROTO_MATCH_PATTERN]);
        assert_eq!(patch.imports[0].from, "validate/");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = VendorConfig::parse("").unwrap();
        assert_eq!(config, VendorConfig::default());
        assert_eq!(config.vendor_dir_name(), DEFAULT_VENDOR_DIR);
        assert!(config.wants_modules());
    }

    #[test]
    fn test_git_only_config_skips_module_pass() {
        let config = VendorConfig::parse(
            r#"
[[imports]]
patterns = ["**/*.proto"]
git = { url = "https://example.com/r", tag = "v1.0.0" }
"#,
        )
        .unwrap();
        assert!(!config.wants_modules());
        let (repo, _) = config.git_imports().next().unwrap();
        assert_eq!(repo.git_ref, GitRef::Tag("v1.0.0".into()));
    }

    #[test]
    fn test_sha_and_tag_are_mutually_exclusive() {
        let err = VendorConfig::parse(
            r#"
[[imports]]
patterns = ["*.proto"]
git = { url = "https://example.com/r", sha = "abc123", tag = "v1" }
"#,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("both `sha` and `tag`"));
    }

    #[test]
    fn test_import_needs_exactly_one_source() {
        let err = VendorConfig::parse("[[imports]]\npatterns = [\"*.proto\"]\n").unwrap_err();
        assert!(format!("{:#}", err).contains("must set `module` or `git`"));

        let err = VendorConfig::parse(
            "[[imports]]\nmodule = \"x\"\ngit = { url = \"https://example.com/r\" }\n",
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("not both"));
    }

    #[test]
    fn test_module_import_defaults_to_proto_pattern() {
        let config = VendorConfig::parse("[[imports]]\nmodule = \"github.com/x\"\n").unwrap();
        assert_eq!(config.imports[0].patterns, vec![PROTO_MATCH_PATTERN]);
    }

    #[test]
    fn test_git_import_needs_patterns_and_url() {
        assert!(VendorConfig::parse("[[imports]]\ngit = { url = \"https://x/y\" }\n").is_err());
        assert!(
            VendorConfig::parse("[[imports]]\npatterns = [\"*\"]\ngit = { url = \" \" }\n")
                .is_err()
        );
    }

    #[test]
    fn test_git_url_cannot_escape_cache_root() {
        for url in ["https://host/../../x", "../elsewhere", "git://host/a/..", "/tmp/../etc/r.git"] {
            let err = VendorConfig::parse(&format!(
                "[[imports]]\npatterns = [\"*\"]\ngit = {{ url = '{}' }}\n",
                url
            ))
            .unwrap_err();
            assert!(format!("{:#}", err).contains("'..'"), "url {}", url);
        }
        assert!(
            VendorConfig::parse("[[imports]]\npatterns = [\"*\"]\ngit = { url = 'https://host/a..b/r' }\n")
                .is_ok()
        );
    }

    #[test]
    fn test_auth_token_sets_credentials() {
        let config = VendorConfig::parse(
            r#"
[[imports]]
patterns = ["*.proto"]
git = { url = "https://example.com/private", auth_user = "bot", auth_token = "t0k" }
"#,
        )
        .unwrap();
        let (repo, _) = config.git_imports().next().unwrap();
        assert_eq!(
            repo.credentials,
            Some(Credentials {
                user: "bot".into(),
                token: "t0k".into()
            })
        );
    }

    #[test]
    fn test_invalid_vendor_dir() {
        let err = VendorConfig::parse("vendor_dir = \".\"\n").unwrap_err();
        assert!(matches!(root_kind(&err), Some(VendorError::InvalidConfig(_))));
    }

    #[test]
    fn test_vendor_dir_override_is_validated() {
        let config = VendorConfig::default().with_vendor_dir("third_party").unwrap();
        assert_eq!(config.vendor_dir_name(), "third_party");
        assert!(VendorConfig::default().with_vendor_dir("..").is_err());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(VendorConfig::parse("vendr_dir = \"x\"\n").is_err());
    }

    #[test]
    fn test_load_missing_file_has_tip() {
        let err = load_config(Path::new("/definitely/not/here/protovend.toml")).unwrap_err();
        assert!(err.to_string().contains("Tip"));
    }
}
