//! Go module resolution.
//!
//! The `go` command knows which modules the project depends on and where each
//! one lives on disk (including `replace` directives). We only ask it for
//! that and never interpret `go.mod` ourselves beyond its `module` line.

use crate::error::VendorError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// A module as resolved by the toolchain. Its `dir` exists on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub import_path: String,
    pub version: String,
    pub dir: PathBuf,
    pub is_main: bool,
}

/// One record of `go list -m -json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModuleInfo {
    pub path: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub replace: Option<Box<ModuleInfo>>,
    #[serde(default)]
    pub main: bool,
    #[serde(default)]
    pub dir: String,
    #[serde(default)]
    pub error: Option<ModuleInfoError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleInfoError {
    #[serde(rename = "Err")]
    pub err: String,
}

/// Where module metadata comes from.
pub trait ModuleSource {
    /// Path of the project's module manifest, `None` outside a module.
    fn manifest_path(&self) -> Result<Option<PathBuf>>;

    /// Paths of every module in the build list, main module excluded.
    fn list_paths(&self) -> Result<Vec<String>>;

    /// Metadata for one module; `None` asks for the main module.
    fn describe(&self, module: Option<&str>) -> Result<ModuleInfo>;
}

/// [`ModuleSource`] backed by the `go` command, run inside `work_dir`.
#[derive(Debug, Clone)]
pub struct GoToolchain {
    work_dir: PathBuf,
    go: String,
}

impl GoToolchain {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            go: "go".to_string(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let command = format!("{} {}", self.go, args.join(" "));
        let output = Command::new(&self.go)
            .args(args)
            .current_dir(&self.work_dir)
            .output()
            .with_context(|| format!("Failed to run `{}` - is Go installed?", command))?;
        if !output.status.success() {
            let mut text = String::from_utf8_lossy(&output.stdout).to_string();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(VendorError::ToolchainFailed {
                command,
                output: text.trim().to_string(),
            }
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl ModuleSource for GoToolchain {
    fn manifest_path(&self) -> Result<Option<PathBuf>> {
        let out = self.run(&["env", "GOMOD"])?;
        let trimmed = out.trim();
        if trimmed.is_empty() || trimmed == "/dev/null" || trimmed == "NUL" {
            return Ok(None);
        }
        Ok(Some(PathBuf::from(trimmed)))
    }

    fn list_paths(&self) -> Result<Vec<String>> {
        let out = self.run(&["list", "-m", "all"])?;
        Ok(parse_module_list(&out))
    }

    fn describe(&self, module: Option<&str>) -> Result<ModuleInfo> {
        let mut args = vec!["list", "-m", "-json"];
        if let Some(module) = module {
            args.push(module);
        }
        let out = self.run(&args)?;
        serde_json::from_str(&out).with_context(|| {
            format!(
                "Failed to parse `go list -m -json` output for {}",
                module.unwrap_or("main module")
            )
        })
    }
}

/// Module paths from `go list -m all`; the first line is the main module.
///
/// Only the first column is used: replaced modules print extra columns
/// (`=> other/module v1.2.3` or `=> ../local`) that we leave to `describe`.
pub fn parse_module_list(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(ToOwned::to_owned)
        .collect()
}

/// Reads the `module` directive of a `go.mod` file.
pub fn read_module_name(manifest: &Path) -> Result<String> {
    let content = fs::read_to_string(manifest)
        .with_context(|| format!("Failed to read {}", manifest.display()))?;
    if content.trim().is_empty() {
        return Err(VendorError::EmptyManifest {
            path: manifest.to_path_buf(),
        }
        .into());
    }

    for line in content.lines() {
        let line = line.split("//").next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("module")
            && rest.starts_with(char::is_whitespace)
        {
            let name = rest.trim().trim_matches('"');
            if !name.is_empty() {
                return Ok(name.to_string());
            }
        }
        break;
    }
    Err(VendorError::MalformedManifest {
        path: manifest.to_path_buf(),
    }
    .into())
}

/// Location of `path@version` in the module cache.
///
/// Upper-case letters are stored as `!` followed by the lower-case letter.
pub fn module_cache_path(cache_root: &Path, path: &str, version: &str) -> PathBuf {
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        if c.is_uppercase() {
            escaped.push('!');
            escaped.extend(c.to_lowercase());
        } else {
            escaped.push(c);
        }
    }
    cache_root.join(format!("{}@{}", escaped, version))
}

/// `$GOMODCACHE`, else `$GOPATH/pkg/mod`, else `~/go/pkg/mod`.
pub fn default_module_cache() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("GOMODCACHE").filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let gopath = match std::env::var_os("GOPATH").filter(|d| !d.is_empty()) {
        // GOPATH may list several entries; the module cache lives in the first.
        Some(list) => std::env::split_paths(&list)
            .next()
            .context("GOPATH is set but empty")?,
        None => dirs::home_dir()
            .context("Could not find home directory")?
            .join("go"),
    };
    Ok(gopath.join("pkg").join("mod"))
}

pub struct ModuleResolver<S> {
    source: S,
    work_dir: PathBuf,
    module_cache: Option<PathBuf>,
}

impl<S: ModuleSource> ModuleResolver<S> {
    pub fn new(source: S, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            work_dir: work_dir.into(),
            module_cache: None,
        }
    }

    /// Overrides the module cache used when the toolchain reports no directory.
    pub fn with_module_cache(mut self, dir: impl Into<PathBuf>) -> Self {
        self.module_cache = Some(dir.into());
        self
    }

    /// Name of the project's own module, read from its manifest.
    pub fn main_module_name(&self) -> Result<String> {
        let manifest = self
            .source
            .manifest_path()?
            .ok_or_else(|| VendorError::NoModuleManifest {
                dir: self.work_dir.clone(),
            })?;
        read_module_name(&manifest)
    }

    /// Resolves dependency modules whose path contains any of `selectors`
    /// (all of them when `selectors` is empty), plus the main module when
    /// `include_main` is set. The main module comes last.
    pub fn resolve(&self, selectors: &[String], include_main: bool) -> Result<Vec<ResolvedModule>> {
        let main_name = self.main_module_name()?;

        let wanted: Vec<String> = self
            .source
            .list_paths()?
            .into_iter()
            .filter(|path| path != &main_name)
            .filter(|path| selects(selectors, path))
            .collect();

        let mut modules = Vec::with_capacity(wanted.len() + 1);
        for path in &wanted {
            let info = self.source.describe(Some(path))?;
            modules.push(self.to_resolved(info, false)?);
        }

        if include_main {
            let mut info = self.source.describe(None)?;
            if info.dir.is_empty() {
                info.dir = self.work_dir.to_string_lossy().to_string();
            }
            if info.path.is_empty() {
                info.path = main_name;
            }
            modules.push(self.to_resolved(info, true)?);
        }

        Ok(modules)
    }

    fn to_resolved(&self, info: ModuleInfo, is_main: bool) -> Result<ResolvedModule> {
        if let Some(error) = &info.error {
            return Err(VendorError::ToolchainFailed {
                command: format!("go list -m -json {}", info.path),
                output: error.err.clone(),
            }
            .into());
        }

        let dir = self.module_dir(&info)?;
        if !dir.exists() {
            return Err(VendorError::ModuleDirMissing {
                module: info.path,
                path: dir,
            }
            .into());
        }

        Ok(ResolvedModule {
            import_path: info.path,
            version: info.version,
            dir,
            is_main: is_main || info.main,
        })
    }

    fn module_dir(&self, info: &ModuleInfo) -> Result<PathBuf> {
        if let Some(replace) = &info.replace {
            if !replace.dir.is_empty() {
                return Ok(self.absolute(&replace.dir));
            }
            // `replace x => ../local` without a reported dir is a filesystem path.
            if replace.version.is_empty() {
                return Ok(self.absolute(&replace.path));
            }
            return self.cached(&replace.path, &replace.version);
        }
        if !info.dir.is_empty() {
            return Ok(self.absolute(&info.dir));
        }
        self.cached(&info.path, &info.version)
    }

    fn cached(&self, path: &str, version: &str) -> Result<PathBuf> {
        let root = match &self.module_cache {
            Some(dir) => dir.clone(),
            None => default_module_cache()?,
        };
        Ok(module_cache_path(&root, path, version))
    }

    fn absolute(&self, dir: &str) -> PathBuf {
        let path = Path::new(dir);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.work_dir.join(path)
        }
    }
}

/// Substring match of a module path against selectors; an empty selector
/// (or an empty list) selects everything.
pub fn selects(selectors: &[String], path: &str) -> bool {
    selectors.is_empty()
        || selectors
            .iter()
            .any(|selector| selector.is_empty() || path.contains(selector.as_str()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::BTreeMap;

    /// In-memory module source for tests.
    #[derive(Default)]
    pub struct FakeModules {
        pub manifest: Option<PathBuf>,
        pub main: ModuleInfo,
        pub deps: BTreeMap<String, ModuleInfo>,
    }

    impl FakeModules {
        pub fn dep(mut self, path: &str, version: &str, dir: &Path) -> Self {
            self.deps.insert(
                path.to_string(),
                ModuleInfo {
                    path: path.to_string(),
                    version: version.to_string(),
                    dir: dir.to_string_lossy().to_string(),
                    ..Default::default()
                },
            );
            self
        }
    }

    impl ModuleSource for FakeModules {
        fn manifest_path(&self) -> Result<Option<PathBuf>> {
            Ok(self.manifest.clone())
        }

        fn list_paths(&self) -> Result<Vec<String>> {
            Ok(self.deps.keys().cloned().collect())
        }

        fn describe(&self, module: Option<&str>) -> Result<ModuleInfo> {
            match module {
                None => Ok(self.main.clone()),
                Some(path) => self
                    .deps
                    .get(path)
                    .cloned()
                    .with_context(|| format!("unknown module {}", path)),
            }
        }
    }

    /// A project dir with a go.mod declaring `name`.
    pub fn project(root: &Path, name: &str) -> FakeModules {
        let manifest = root.join("go.mod");
        fs::write(&manifest, format!("module {}\n\ngo 1.22\n", name)).unwrap();
        FakeModules {
            manifest: Some(manifest),
            main: ModuleInfo {
                path: name.to_string(),
                main: true,
                dir: root.to_string_lossy().to_string(),
                ..Default::default()
            },
            deps: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{FakeModules, project};
    use super::*;
    use crate::error::root_kind;
    use tempfile::tempdir;

    #[test]
    fn test_parse_module_list_skips_main_and_replacements() {
        let out = "github.com/acme/app\n\
                   github.com/envoyproxy/protoc-gen-validate v0.10.1\n\
                   k8s.io/api v0.0.0-2019 => k8s.io/api v0.0.0-2020\n\
                   example.com/local v1.0.0 => ../local\n";
        assert_eq!(
            parse_module_list(out),
            vec![
                "github.com/envoyproxy/protoc-gen-validate",
                "k8s.io/api",
                "example.com/local"
            ]
        );
    }

    #[test]
    fn test_module_info_parses_go_list_json() {
        let json = r#"{
            "Path": "k8s.io/api",
            "Version": "v0.0.0-2019",
            "Replace": {
                "Path": "../api",
                "Dir": "/src/api",
                "GoMod": "/src/api/go.mod"
            },
            "Dir": "/src/api",
            "GoVersion": "1.21"
        }"#;
        let info: ModuleInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.path, "k8s.io/api");
        assert!(!info.main);
        let replace = info.replace.unwrap();
        assert_eq!(replace.dir, "/src/api");
        assert_eq!(replace.version, "");
    }

    #[test]
    fn test_module_cache_path_escapes_capitals() {
        let root = Path::new("/gopath/pkg/mod");
        assert_eq!(
            module_cache_path(root, "github.com/Microsoft/package", "this_is_a_hash"),
            root.join("github.com/!microsoft/package@this_is_a_hash")
        );
        assert_eq!(
            module_cache_path(root, "github.com/microsoft/package", "v1.0.0"),
            root.join("github.com/microsoft/package@v1.0.0")
        );
    }

    #[test]
    fn test_read_module_name() {
        let dir = tempdir().unwrap();
        let manifest = dir.path().join("go.mod");

        fs::write(&manifest, "// comment\n\nmodule github.com/acme/app // trailing\n\ngo 1.22\n").unwrap();
        assert_eq!(read_module_name(&manifest).unwrap(), "github.com/acme/app");

        fs::write(&manifest, "  \n").unwrap();
        let err = read_module_name(&manifest).unwrap_err();
        assert!(matches!(root_kind(&err), Some(VendorError::EmptyManifest { .. })));

        fs::write(&manifest, "go 1.22\nmodule late\n").unwrap();
        let err = read_module_name(&manifest).unwrap_err();
        assert!(matches!(root_kind(&err), Some(VendorError::MalformedManifest { .. })));

        fs::write(&manifest, "modulex foo\n").unwrap();
        assert!(read_module_name(&manifest).is_err());
    }

    #[test]
    fn test_resolve_outside_module_fails() {
        let dir = tempdir().unwrap();
        let resolver = ModuleResolver::new(FakeModules::default(), dir.path());
        let err = resolver.resolve(&[], true).unwrap_err();
        assert!(matches!(root_kind(&err), Some(VendorError::NoModuleManifest { .. })));
    }

    #[test]
    fn test_resolve_selects_by_substring_and_appends_main() {
        let root = tempdir().unwrap();
        let dep_a = tempdir().unwrap();
        let dep_b = tempdir().unwrap();
        let source = project(root.path(), "github.com/acme/app")
            .dep("github.com/envoyproxy/protoc-gen-validate", "v0.10.1", dep_a.path())
            .dep("github.com/golang/protobuf", "v1.5.0", dep_b.path());

        let resolver = ModuleResolver::new(source, root.path());
        let modules = resolver.resolve(&["envoyproxy".to_string()], true).unwrap();

        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].import_path, "github.com/envoyproxy/protoc-gen-validate");
        assert_eq!(modules[0].version, "v0.10.1");
        assert_eq!(modules[0].dir, dep_a.path());
        assert!(!modules[0].is_main);
        assert_eq!(modules[1].import_path, "github.com/acme/app");
        assert!(modules[1].is_main);
    }

    #[test]
    fn test_resolve_without_selectors_takes_everything() {
        let root = tempdir().unwrap();
        let dep = tempdir().unwrap();
        let source = project(root.path(), "github.com/acme/app")
            .dep("a.example/x", "v1", dep.path())
            .dep("b.example/y", "v2", dep.path());

        let resolver = ModuleResolver::new(source, root.path());
        let modules = resolver.resolve(&[], false).unwrap();
        let paths: Vec<_> = modules.iter().map(|m| m.import_path.as_str()).collect();
        assert_eq!(paths, vec!["a.example/x", "b.example/y"]);
    }

    #[test]
    fn test_missing_module_dir_is_actionable() {
        let root = tempdir().unwrap();
        let gone = root.path().join("gone");
        let source = project(root.path(), "github.com/acme/app").dep("a.example/x", "v1", &gone);

        let resolver = ModuleResolver::new(source, root.path());
        let err = resolver.resolve(&[], false).unwrap_err();
        match root_kind(&err) {
            Some(VendorError::ModuleDirMissing { module, path }) => {
                assert_eq!(module, "a.example/x");
                assert_eq!(path, &gone);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("go mod download"));
    }

    #[test]
    fn test_replace_directive_wins() {
        let root = tempdir().unwrap();
        let local = root.path().join("third_party/api");
        fs::create_dir_all(&local).unwrap();

        let mut source = project(root.path(), "github.com/acme/app");
        source.deps.insert(
            "k8s.io/api".to_string(),
            ModuleInfo {
                path: "k8s.io/api".to_string(),
                version: "v0.1.0".to_string(),
                replace: Some(Box::new(ModuleInfo {
                    path: "./third_party/api".to_string(),
                    ..Default::default()
                })),
                ..Default::default()
            },
        );

        let resolver = ModuleResolver::new(source, root.path());
        let modules = resolver.resolve(&[], false).unwrap();
        assert_eq!(modules[0].dir, root.path().join("./third_party/api"));
        assert!(modules[0].dir.exists());
    }

    #[test]
    fn test_module_without_dir_falls_back_to_module_cache() {
        let root = tempdir().unwrap();
        let cache = tempdir().unwrap();
        let expected = cache.path().join("github.com/!acme/protos@v1.2.3");
        fs::create_dir_all(&expected).unwrap();

        let mut source = project(root.path(), "github.com/acme/app");
        source.deps.insert(
            "github.com/Acme/protos".to_string(),
            ModuleInfo {
                path: "github.com/Acme/protos".to_string(),
                version: "v1.2.3".to_string(),
                ..Default::default()
            },
        );

        let resolver = ModuleResolver::new(source, root.path()).with_module_cache(cache.path());
        let modules = resolver.resolve(&[], false).unwrap();
        assert_eq!(modules[0].dir, expected);
    }

    #[test]
    fn test_selects() {
        assert!(selects(&[], "anything"));
        assert!(selects(&["".to_string()], "anything"));
        assert!(selects(&["proto".to_string()], "github.com/golang/protobuf"));
        assert!(!selects(&["envoy".to_string()], "github.com/golang/protobuf"));
    }
}
