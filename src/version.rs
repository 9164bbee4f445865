//! Compiler release index and `pragma solidity` resolution.
//!
//! The index mirrors the `list.json` published next to the solc binaries: an
//! ordered list of builds plus a `version -> file name` map of the official
//! releases. Resolution picks the concrete release a source file asks for.

use std::{collections::BTreeMap, time::Duration};

use backon::{ExponentialBuilder, Retryable};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use reqwest::Client;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::errors::RequestFailure;

lazy_static! {
    static ref PRAGMA: Result<Regex, regex::Error> = Regex::new(r"pragma\s+solidity\s+([^;]+);");
    static ref HYPHEN_RANGE: Result<Regex, regex::Error> = Regex::new(r"^(\S+)\s+-\s+(\S+)$");
    static ref COMPARATOR: Result<Regex, regex::Error> = Regex::new(
        r"(\^|~|>=|<=|>|<|=)?\s*v?([0-9xX*]+(?:\.[0-9xX*]+){0,2}(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?)"
    );
}

pub const DEFAULT_INDEX_URL: &str = "https://binaries.soliditylang.org/bin/list.json";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Failure(#[from] RequestFailure),

    #[error("[E011] Compiler index is not valid JSON: {0}\n\nSuggestions:\n  • Check that --index-url points at a solc list.json file")]
    Json(#[from] serde_json::Error),
}

impl IndexError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Reqwest(_) => "E999",
            Self::Failure(f) => f.error_code().as_str(),
            Self::Json(_) => "E011",
        }
    }

    fn is_transient(&self) -> bool {
        match self {
            Self::Reqwest(e) => e.is_timeout() || e.is_connect(),
            Self::Failure(f) => f.status.is_server_error(),
            Self::Json(_) => false,
        }
    }
}

/// One compiler build as listed in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerRelease {
    #[serde(default)]
    pub path: String,
    pub version: String,
    pub long_version: String,
    #[serde(default)]
    pub build: String,
}

/// Read-only view of the published compiler builds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerIndex {
    #[serde(default)]
    builds: Vec<CompilerRelease>,
    #[serde(default)]
    releases: BTreeMap<String, String>,
}

impl CompilerIndex {
    pub fn new(builds: Vec<CompilerRelease>, releases: BTreeMap<String, String>) -> Self {
        Self { builds, releases }
    }

    /// # Errors
    ///
    /// Will return `Err` if `raw` is not a `list.json` document.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Fetches the index, retrying timeouts and server errors.
    ///
    /// # Errors
    ///
    /// Will return `Err` when every attempt fails or the body can't be parsed.
    pub async fn fetch(client: &Client, url: &Url) -> Result<Self, IndexError> {
        (|| Self::fetch_once(client, url))
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(500))
                    .with_max_delay(Duration::from_secs(5))
                    .with_max_times(2),
            )
            .when(IndexError::is_transient)
            .notify(|err: &IndexError, dur: Duration| {
                warn!("Compiler index fetch failed ({err}), retrying in {dur:?}");
            })
            .await
    }

    async fn fetch_once(client: &Client, url: &Url) -> Result<Self, IndexError> {
        debug!("Fetching compiler index from {url}");
        let response = client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IndexError::from(RequestFailure::new(
                url.clone(),
                status,
                response.text().await?,
            )));
        }
        let body = response.text().await?;
        Ok(Self::from_json(&body)?)
    }

    /// Builds in index order.
    pub fn builds(&self) -> &[CompilerRelease] {
        &self.builds
    }

    /// The `version -> release file` map.
    pub const fn releases(&self) -> &BTreeMap<String, String> {
        &self.releases
    }

    pub fn contains(&self, version: &str) -> bool {
        self.releases.contains_key(version)
    }

    /// Release file name the index designates for `version`.
    pub fn canonical_id(&self, version: &str) -> Option<&str> {
        self.releases.get(version).map(String::as_str)
    }

    /// The official build of `version`, nightlies excluded.
    pub fn release(&self, version: &str) -> Option<&CompilerRelease> {
        let path = self.canonical_id(version)?;
        self.builds
            .iter()
            .find(|build| build.path == path)
            .or_else(|| {
                self.builds
                    .iter()
                    .find(|build| build.version == version && !build.long_version.contains('-'))
            })
    }

    pub fn long_version(&self, version: &str) -> Option<&str> {
        self.release(version).map(|r| r.long_version.as_str())
    }

    /// Release versions, highest first. Keys that are not semver are skipped.
    fn sorted_releases(&self) -> Vec<(Version, &str)> {
        let mut versions: Vec<(Version, &str)> = self
            .releases
            .keys()
            .filter_map(|key| Version::parse(key).ok().map(|v| (v, key.as_str())))
            .collect();
        versions.sort_by(|a, b| b.0.cmp(&a.0));
        versions
    }
}

/// The version expression of the first `pragma solidity` clause in `source`.
///
/// Later pragmas are ignored.
pub fn extract_pragma(source: &str) -> Option<&str> {
    PRAGMA
        .as_ref()
        .ok()?
        .captures(source)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().trim())
}

/// Picks the compiler release `source` should be built with.
///
/// A pragma naming a release present in the index is returned as is. Anything
/// else is read as a range and resolved to the highest satisfying release.
pub fn resolve_version(source: &str, index: &CompilerIndex) -> Option<String> {
    let spec = extract_pragma(source)?;

    if Version::parse(spec).is_ok() && index.contains(spec) {
        return Some(spec.to_owned());
    }

    let Some(range) = parse_range(spec) else {
        debug!("Unparsable solidity pragma: {spec}");
        return None;
    };

    index
        .sorted_releases()
        .into_iter()
        .find(|(version, _)| range.iter().any(|req| req.matches(version)))
        .map(|(_, key)| key.to_owned())
}

/// Translates an npm-style range (`>=0.7.0 <0.9.0`, `^0.8.0 || 0.7.6`,
/// `0.6.0 - 0.6.12`) into alternatives for [`VersionReq`].
pub fn parse_range(spec: &str) -> Option<Vec<VersionReq>> {
    spec.split("||")
        .map(|alternative| parse_comparator_set(alternative.trim()))
        .collect()
}

fn parse_comparator_set(set: &str) -> Option<VersionReq> {
    if set.is_empty() || matches!(set, "*" | "x" | "X") {
        return Some(VersionReq::STAR);
    }

    if let Some(captures) = HYPHEN_RANGE.as_ref().ok()?.captures(set) {
        let lower = captures.get(1)?.as_str().trim_start_matches('v');
        let upper = captures.get(2)?.as_str().trim_start_matches('v');
        return VersionReq::parse(&format!(">={lower}, <={upper}")).ok();
    }

    let mut comparators = Vec::new();
    let mut consumed = 0;
    for captures in COMPARATOR.as_ref().ok()?.captures_iter(set) {
        let whole = captures.get(0)?;
        if !set[consumed..whole.start()]
            .chars()
            .all(|c| c.is_whitespace() || c == ',')
        {
            return None;
        }
        consumed = whole.end();

        let version = captures.get(2)?.as_str();
        let comparator = match captures.get(1).map(|op| op.as_str()) {
            Some(op) => format!("{op}{version}"),
            None if version.contains(['x', 'X', '*']) => version.to_owned(),
            // a bare version is an exact match, not a caret range
            None => format!("={version}"),
        };
        comparators.push(comparator);
    }

    if comparators.is_empty() || !set[consumed..].trim().is_empty() {
        return None;
    }

    VersionReq::parse(&comparators.join(", ")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(versions: &[&str]) -> CompilerIndex {
        let builds = versions
            .iter()
            .map(|v| CompilerRelease {
                path: format!("soljson-v{v}+commit.0000000{}.js", v.len()),
                version: (*v).to_owned(),
                long_version: format!("{v}+commit.0000000{}", v.len()),
                build: format!("commit.0000000{}", v.len()),
            })
            .collect::<Vec<_>>();
        let releases = builds
            .iter()
            .map(|b| (b.version.clone(), b.path.clone()))
            .collect();
        CompilerIndex::new(builds, releases)
    }

    #[test]
    fn test_extract_first_pragma_only() {
        let source = "pragma solidity ^0.8.0;\ncontract A {}\npragma solidity 0.7.6;";
        assert_eq!(extract_pragma(source), Some("^0.8.0"));
    }

    #[test]
    fn test_extract_missing_pragma() {
        assert_eq!(extract_pragma("contract A {}"), None);
    }

    #[test]
    fn test_exact_version_in_index_is_returned() {
        let index = index(&["0.8.17", "0.8.18", "0.8.19"]);
        let source = "pragma solidity 0.8.17;";
        assert_eq!(resolve_version(source, &index), Some("0.8.17".to_owned()));
    }

    #[test]
    fn test_exact_version_missing_from_index() {
        let index = index(&["0.8.18"]);
        assert_eq!(resolve_version("pragma solidity 0.8.17;", &index), None);
    }

    #[test]
    fn test_range_resolves_to_highest_match() {
        let index = index(&["0.6.12", "0.7.6", "0.8.17", "0.8.18", "0.9.0"]);
        let source = "// SPDX-License-Identifier: MIT\npragma solidity >=0.7.0 <0.9.0;";
        assert_eq!(resolve_version(source, &index), Some("0.8.18".to_owned()));
    }

    #[test]
    fn test_caret_and_tilde_ranges() {
        let index = index(&["0.7.6", "0.8.4", "0.8.18"]);
        assert_eq!(
            resolve_version("pragma solidity ^0.7.0;", &index),
            Some("0.7.6".to_owned())
        );
        assert_eq!(
            resolve_version("pragma solidity ~0.8.4;", &index),
            Some("0.8.18".to_owned())
        );
    }

    #[test]
    fn test_range_alternatives_and_hyphen() {
        let index = index(&["0.5.17", "0.6.12", "0.8.18"]);
        assert_eq!(
            resolve_version("pragma solidity ^0.5.0 || ^0.6.0;", &index),
            Some("0.6.12".to_owned())
        );
        assert_eq!(
            resolve_version("pragma solidity 0.5.0 - 0.6.0;", &index),
            Some("0.5.17".to_owned())
        );
    }

    #[test]
    fn test_unsatisfiable_range() {
        let index = index(&["0.8.18"]);
        assert_eq!(resolve_version("pragma solidity ^0.4.0;", &index), None);
    }

    #[test]
    fn test_garbage_range() {
        let index = index(&["0.8.18"]);
        assert_eq!(resolve_version("pragma solidity latest;", &index), None);
        assert!(parse_range("banana").is_none());
    }

    #[test]
    fn test_release_lookup_skips_nightlies() {
        let raw = r#"{
            "builds": [
                {"path": "soljson-v0.8.19-nightly.2023.1.5+commit.e4fd4b75.js", "version": "0.8.19", "longVersion": "0.8.19-nightly.2023.1.5+commit.e4fd4b75", "build": "commit.e4fd4b75"},
                {"path": "soljson-v0.8.19+commit.7dd6d404.js", "version": "0.8.19", "longVersion": "0.8.19+commit.7dd6d404", "build": "commit.7dd6d404"}
            ],
            "releases": {"0.8.19": "soljson-v0.8.19+commit.7dd6d404.js"},
            "latestRelease": "0.8.19"
        }"#;
        let index = CompilerIndex::from_json(raw).unwrap();
        assert_eq!(index.long_version("0.8.19"), Some("0.8.19+commit.7dd6d404"));
        assert_eq!(
            index.canonical_id("0.8.19"),
            Some("soljson-v0.8.19+commit.7dd6d404.js")
        );
        assert!(index.long_version("0.8.20").is_none());
    }
}
