//! Discovery of the files a Solidity source needs to compile.
//!
//! Import lists are plain values: every operation takes a slice of
//! [`ImportSpec`] and returns the next list, so callers drive the loop
//! until [`ImportResolver::resolve`] stops growing it.

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    fs,
};
use thiserror::Error;
use walkdir::WalkDir;

lazy_static! {
    static ref IMPORT: Result<Regex, regex::Error> = Regex::new(
        r#"import\s+(?:\{[^}]*\}\s*from\s+|\*\s+as\s+\w+\s+from\s+)?["']([^"']+)["']"#
    );
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("[E026] I/O error reading file '{path}': {error}\n\nSuggestions:\n  • Check file exists and is readable\n  • Verify file permissions")]
    IoError { path: String, error: String },

    #[error("[E014] Path contains invalid UTF-8 characters\n\nSuggestions:\n  • Use only ASCII characters in file paths\n  • Avoid special characters in directory names")]
    Utf8(#[from] camino::FromPathBufError),

    #[error("[E027] '{path}' is not inside source directory '{root}'")]
    OutsideRoot { path: String, root: String },
}

impl Error {
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::IoError { .. } => "E026",
            Self::Utf8(_) => "E014",
            Self::OutsideRoot { .. } => "E027",
        }
    }
}

/// An import path and, once known, the content it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSpec {
    pub path: String,
    pub source: Option<String>,
    pub source_file_name: Option<String>,
}

impl ImportSpec {
    pub fn unresolved(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: None,
            source_file_name: None,
        }
    }

    pub const fn is_resolved(&self) -> bool {
        self.source.is_some()
    }

    /// Last segment of the import path.
    pub fn file_name(&self) -> &str {
        file_name(&self.path)
    }
}

pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Number of specs still waiting for their content.
pub fn unresolved_count(specs: &[ImportSpec]) -> usize {
    specs.iter().filter(|spec| !spec.is_resolved()).count()
}

/// Returns `specs` with the content of `path` filled in.
pub fn supply_source(
    specs: &[ImportSpec],
    path: &str,
    source: impl Into<String>,
    source_file_name: Option<String>,
) -> Vec<ImportSpec> {
    let source = source.into();
    specs
        .iter()
        .map(|spec| {
            if spec.path == path {
                ImportSpec {
                    path: spec.path.clone(),
                    source: Some(source.clone()),
                    source_file_name: source_file_name.clone(),
                }
            } else {
                spec.clone()
            }
        })
        .collect()
}

/// Scans sources for `import` statements.
///
/// Imports whose file name is listed as builtin are provided by the
/// compiler environment and never show up as specs.
#[derive(Debug, Clone, Default)]
pub struct ImportResolver {
    builtin_imports: HashSet<String>,
}

impl ImportResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins<I, S>(builtins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            builtin_imports: builtins.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_builtin(&self, path: &str) -> bool {
        self.builtin_imports.contains(file_name(path))
    }

    /// Import paths of `source` in order of appearance, without duplicates.
    pub fn imports_of(&self, source: &str) -> Vec<String> {
        let Some(pattern) = IMPORT.as_ref().ok() else {
            return Vec::new();
        };

        pattern
            .captures_iter(source)
            .filter_map(|captures| captures.get(1))
            .map(|m| m.as_str().to_owned())
            .filter(|path| !self.is_builtin(path))
            .unique()
            .collect()
    }

    /// Unresolved specs for the direct imports of an entry source.
    pub fn seed(&self, source: &str) -> Vec<ImportSpec> {
        self.imports_of(source)
            .into_iter()
            .map(ImportSpec::unresolved)
            .collect()
    }

    /// One scanning pass: appends a spec for every import of a resolved spec
    /// that isn't listed yet. Existing entries keep their position.
    pub fn resolve(&self, specs: &[ImportSpec]) -> Vec<ImportSpec> {
        let mut known: HashSet<String> = specs.iter().map(|spec| spec.path.clone()).collect();
        let mut next = specs.to_vec();

        for spec in specs {
            let Some(source) = &spec.source else {
                continue;
            };
            for path in self.imports_of(source) {
                if known.insert(path.clone()) {
                    debug!("{} imports unknown file {path}", spec.path);
                    next.push(ImportSpec::unresolved(path));
                }
            }
        }

        next
    }

    /// Repeats [`Self::resolve`] until the list stops growing.
    pub fn resolve_to_fixed_point(&self, specs: &[ImportSpec]) -> Vec<ImportSpec> {
        let mut current = specs.to_vec();
        loop {
            let next = self.resolve(&current);
            if next.len() == current.len() {
                return next;
            }
            current = next;
        }
    }
}

/// Solidity files found under a directory, keyed by their relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceTree {
    files: BTreeMap<Utf8PathBuf, String>,
}

impl SourceTree {
    /// # Errors
    ///
    /// Will return `Err` if a file under `root` can't be read or its path
    /// isn't UTF-8.
    pub fn load(root: &Utf8Path) -> Result<Self, Error> {
        debug!("Collecting solidity sources under {root}");
        let mut files = BTreeMap::new();

        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.map_err(|e| Error::IoError {
                path: root.to_string(),
                error: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = Utf8PathBuf::try_from(entry.into_path())?;
            if path.extension() != Some("sol") {
                continue;
            }

            let content = fs::read_to_string(&path).map_err(|e| Error::IoError {
                path: path.to_string(),
                error: e.to_string(),
            })?;
            let relative = path
                .strip_prefix(root)
                .map_err(|_| Error::OutsideRoot {
                    path: path.to_string(),
                    root: root.to_string(),
                })?
                .to_owned();
            debug!("Found source {relative}");
            files.insert(relative, content);
        }

        Ok(Self { files })
    }

    pub fn from_files<I, P, S>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, S)>,
        P: Into<Utf8PathBuf>,
        S: Into<String>,
    {
        Self {
            files: files
                .into_iter()
                .map(|(path, content)| (path.into(), content.into()))
                .collect(),
        }
    }

    pub const fn files(&self) -> &BTreeMap<Utf8PathBuf, String> {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// File name to content map, as uploaded to the verification server.
    pub fn to_file_map(&self) -> BTreeMap<String, String> {
        self.files
            .iter()
            .map(|(path, content)| (path.to_string(), content.clone()))
            .collect()
    }

    /// Finds the file an import path refers to.
    ///
    /// Relative segments are dropped and the rest is matched as a path
    /// suffix; failing that, a unique file with the same name is used.
    pub fn lookup(&self, import_path: &str) -> Option<(&Utf8Path, &str)> {
        let normalized: Utf8PathBuf = import_path
            .split('/')
            .filter(|segment| !matches!(*segment, "" | "." | ".."))
            .join("/")
            .into();

        if normalized.as_str().is_empty() {
            return None;
        }

        let by_suffix = self
            .files
            .iter()
            .filter(|(path, _)| path.ends_with(&normalized))
            .min_by_key(|(path, _)| path.components().count());
        if let Some((path, content)) = by_suffix {
            return Some((path.as_path(), content.as_str()));
        }

        let name = file_name(import_path);
        self.files
            .iter()
            .filter(|(path, _)| path.file_name() == Some(name))
            .exactly_one()
            .ok()
            .map(|(path, content)| (path.as_path(), content.as_str()))
    }

    /// Supplies every unresolved spec this tree has a file for.
    pub fn fill(&self, specs: &[ImportSpec]) -> Vec<ImportSpec> {
        specs
            .iter()
            .map(|spec| {
                if spec.is_resolved() {
                    return spec.clone();
                }
                match self.lookup(&spec.path) {
                    Some((path, content)) => ImportSpec {
                        path: spec.path.clone(),
                        source: Some(content.to_owned()),
                        source_file_name: Some(path.to_string()),
                    },
                    None => spec.clone(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TOKEN_SOURCE: &str = r#"
// SPDX-License-Identifier: Apache-2.0
pragma solidity >=0.5.0 <0.9.0;

import "./HederaTokenService.sol";
import "./HederaResponseCodes.sol";

contract TokenSender is HederaTokenService {}
"#;

    #[test]
    fn test_imports_in_order() {
        let resolver = ImportResolver::new();
        assert_eq!(
            resolver.imports_of(TOKEN_SOURCE),
            vec!["./HederaTokenService.sol", "./HederaResponseCodes.sol"]
        );
    }

    #[test]
    fn test_import_forms() {
        let source = r#"
import "a/A.sol";
import 'b/B.sol';
import "c/C.sol" as C;
import {D, E} from "d/D.sol";
import * as F from "f/F.sol";
import "a/A.sol";
"#;
        let resolver = ImportResolver::new();
        assert_eq!(
            resolver.imports_of(source),
            vec!["a/A.sol", "b/B.sol", "c/C.sol", "d/D.sol", "f/F.sol"]
        );
    }

    #[test]
    fn test_no_imports() {
        let resolver = ImportResolver::new();
        assert!(resolver.imports_of("contract A {}").is_empty());
        assert!(resolver.seed("").is_empty());
    }

    #[test]
    fn test_builtin_imports_are_excluded() {
        let resolver = ImportResolver::with_builtins(["HederaResponseCodes.sol"]);
        assert_eq!(
            resolver.imports_of(TOKEN_SOURCE),
            vec!["./HederaTokenService.sol"]
        );
    }

    #[test]
    fn test_resolve_appends_new_paths_once() {
        let resolver = ImportResolver::new();
        let specs = resolver.seed(TOKEN_SOURCE);
        assert_eq!(unresolved_count(&specs), 2);

        let specs = supply_source(
            &specs,
            "./HederaTokenService.sol",
            "import \"./HederaResponseCodes.sol\";\nimport \"./IHederaTokenService.sol\";",
            Some("HederaTokenService.sol".to_owned()),
        );
        let specs = resolver.resolve(&specs);
        let paths: Vec<&str> = specs.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "./HederaTokenService.sol",
                "./HederaResponseCodes.sol",
                "./IHederaTokenService.sol"
            ]
        );
        assert_eq!(unresolved_count(&specs), 2);
    }

    #[test]
    fn test_resolve_is_idempotent_at_fixed_point() {
        let resolver = ImportResolver::new();
        let specs = supply_source(
            &resolver.seed(TOKEN_SOURCE),
            "./HederaResponseCodes.sol",
            "import \"./HederaTokenService.sol\";",
            None,
        );
        let fixed = resolver.resolve_to_fixed_point(&specs);
        assert_eq!(resolver.resolve(&fixed), fixed);

        let unique: HashSet<&str> = fixed.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(unique.len(), fixed.len());
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("@openzeppelin/contracts/token/ERC20.sol"), "ERC20.sol");
        assert_eq!(file_name("ERC20.sol"), "ERC20.sol");
        assert_eq!(ImportSpec::unresolved("./a/B.sol").file_name(), "B.sol");
    }

    #[test]
    fn test_lookup_by_suffix_and_name() {
        let tree = SourceTree::from_files([
            ("contracts/Token.sol", "token"),
            ("lib/hedera/HederaTokenService.sol", "hts"),
            ("lib/hedera/HederaResponseCodes.sol", "codes"),
        ]);

        let (path, content) = tree.lookup("../hedera/HederaTokenService.sol").unwrap();
        assert_eq!(path, Utf8Path::new("lib/hedera/HederaTokenService.sol"));
        assert_eq!(content, "hts");

        let (path, _) = tree.lookup("./HederaResponseCodes.sol").unwrap();
        assert_eq!(path, Utf8Path::new("lib/hedera/HederaResponseCodes.sol"));

        assert!(tree.lookup("./Missing.sol").is_none());
        assert!(tree.lookup("./").is_none());
    }

    #[test]
    fn test_lookup_ambiguous_file_name() {
        let tree = SourceTree::from_files([("a/x/Util.sol", "a"), ("b/y/Util.sol", "b")]);
        assert!(tree.lookup("z/Util.sol").is_none());
    }

    #[test]
    fn test_load_and_fill() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        std::fs::create_dir_all(root.join("hedera")).unwrap();
        std::fs::write(root.join("Token.sol"), TOKEN_SOURCE).unwrap();
        std::fs::write(
            root.join("hedera/HederaTokenService.sol"),
            "import \"./HederaResponseCodes.sol\";",
        )
        .unwrap();
        std::fs::write(root.join("hedera/HederaResponseCodes.sol"), "library Codes {}").unwrap();
        std::fs::write(root.join("README.md"), "not solidity").unwrap();

        let tree = SourceTree::load(&root).unwrap();
        assert_eq!(tree.files().len(), 3);

        let resolver = ImportResolver::new();
        let mut specs = resolver.seed(TOKEN_SOURCE);
        loop {
            let next = resolver.resolve_to_fixed_point(&tree.fill(&specs));
            if next == specs {
                break;
            }
            specs = next;
        }

        assert_eq!(specs.len(), 2);
        assert_eq!(unresolved_count(&specs), 0);
        assert_eq!(
            specs[0].source_file_name.as_deref(),
            Some("hedera/HederaTokenService.sol")
        );
    }
}
