//! Line-oriented patching of vendored `.proto` files.
//!
//! Vendored files usually carry a `go_package` option pointing at their
//! upstream location. This rewrites (or inserts) that option and, optionally,
//! the targets of `import` statements, without parsing protobuf.

use crate::config::PatchConfig;
use crate::deps::find_matches;
use crate::error::VendorError;
use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

const GO_PACKAGE_OPTION: &str = "option go_package";

static IMPORT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(\s*import\s+(?:public\s+|weak\s+)?)"([^"]*)"(.*)$"#)
        .expect("import regex is valid")
});

pub type LineRewrite<'a> = &'a dyn Fn(&str) -> String;

/// Sets `option go_package` in `path` and applies `rewrite` to every line.
///
/// An existing option line is replaced; otherwise the option is inserted
/// right after the `package` statement (or after `syntax` when the file has
/// no package). Running it twice gives the same bytes as running it once.
/// An empty `go_package` leaves the option alone.
pub fn patch_proto_file(path: &Path, go_package: &str, rewrite: Option<LineRewrite<'_>>) -> Result<()> {
    if go_package.is_empty() && rewrite.is_none() {
        return Ok(());
    }

    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let patched = patch_lines(&content, go_package, rewrite).ok_or_else(|| {
        VendorError::MissingPackageStatement {
            path: path.to_path_buf(),
        }
    })?;

    let permissions = fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .permissions();
    fs::write(path, patched).with_context(|| format!("Failed to write {}", path.display()))?;
    fs::set_permissions(path, permissions)
        .with_context(|| format!("Failed to restore permissions on {}", path.display()))?;
    Ok(())
}

/// Returns `None` when an option has to be inserted and there is no anchor.
///
/// Lines are written back with the ending of the first line (`\r\n` or `\n`).
fn patch_lines(content: &str, go_package: &str, rewrite: Option<LineRewrite<'_>>) -> Option<String> {
    let option_line = format!("{} = \"{}\";", GO_PACKAGE_OPTION, go_package);
    let eol = match content.split_once('\n') {
        Some((first, _)) if first.ends_with('\r') => "\r\n",
        _ => "\n",
    };

    let mut lines: Vec<String> = content
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_owned())
        .collect();
    let mut package_line = None;
    let mut syntax_line = None;
    let mut replaced = false;

    for (i, line) in lines.iter_mut().enumerate() {
        if let Some(rewrite) = rewrite {
            *line = rewrite(line.as_str());
        }
        if line.starts_with("package") {
            package_line.get_or_insert(i);
        } else if line.starts_with("syntax") {
            syntax_line.get_or_insert(i);
        } else if line.starts_with(GO_PACKAGE_OPTION) && !go_package.is_empty() {
            *line = option_line.clone();
            replaced = true;
        }
    }

    if !replaced && !go_package.is_empty() {
        let anchor = package_line.or(syntax_line)?;
        lines.insert(anchor + 1, option_line);
    }
    Some(lines.join(eol))
}

/// Wraps an import-path mapping into a line rewrite that only touches
/// `import "..."` statements.
pub fn import_rewriter<F>(map: F) -> impl Fn(&str) -> String
where
    F: Fn(&str) -> String,
{
    move |line: &str| match IMPORT_LINE.captures(line) {
        Some(caps) => format!("{}\"{}\"{}", &caps[1], map(&caps[2]), &caps[3]),
        None => line.to_string(),
    }
}

type GoPackageFn = Box<dyn Fn(&Path) -> String>;
type ImportFn = Box<dyn Fn(&str) -> String>;

/// Patches every file under `root` matching `patterns`.
pub struct ProtoFilePatcher {
    pub root: PathBuf,
    pub patterns: Vec<String>,
    /// Receives the path relative to `root`.
    pub go_package: Option<GoPackageFn>,
    pub imports: Option<ImportFn>,
}

impl ProtoFilePatcher {
    pub fn from_config(root: impl Into<PathBuf>, config: &PatchConfig) -> Self {
        let go_package = config.go_package_prefix.clone().map(|prefix| {
            Box::new(move |rel: &Path| go_package_for(&prefix, rel)) as GoPackageFn
        });

        let imports = (!config.imports.is_empty()).then(|| {
            let rules = config.imports.clone();
            Box::new(move |import: &str| {
                for rule in &rules {
                    if let Some(rest) = import.strip_prefix(rule.from.as_str()) {
                        return format!("{}{}", rule.to, rest);
                    }
                }
                import.to_string()
            }) as ImportFn
        });

        Self {
            root: root.into(),
            patterns: config.patterns.clone(),
            go_package,
            imports,
        }
    }

    /// Returns the number of files patched.
    pub fn patch_all(&self) -> Result<usize> {
        let files = find_matches(&self.patterns, &self.root, &[])?;
        let rewrite = self.imports.as_ref().map(|map| import_rewriter(map));

        let mut patched = 0;
        for file in files.iter().filter(|f| f.is_file()) {
            let go_package = match &self.go_package {
                Some(f) => f(file.strip_prefix(&self.root).unwrap_or(file)),
                None => String::new(),
            };
            let line_rewrite = rewrite.as_ref().map(|r| r as &dyn Fn(&str) -> String);
            patch_proto_file(file, &go_package, line_rewrite)
                .with_context(|| format!("Failed to patch {}", file.display()))?;
            patched += 1;
        }
        Ok(patched)
    }
}

/// `{prefix}/{directory of rel}` with `/` separators.
pub fn go_package_for(prefix: &str, rel: &Path) -> String {
    let dir = rel
        .parent()
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default();
    let prefix = prefix.trim_end_matches('/');
    if dir.is_empty() {
        prefix.to_string()
    } else {
        format!("{}/{}", prefix, dir)
    }
}
