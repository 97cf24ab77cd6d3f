//! Module path parsing and source resolution
//!
//! A module `path` is either a directory relative to the environment root
//! or a remote reference of the form `source::uri//location?key=value&...`
//! that a [`SourceFetcher`] turns into a local checkout.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Source name of paths that need no fetching
pub const LOCAL_SOURCE: &str = "local";

/// Parsed module `path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePath {
    pub source: String,
    pub uri: String,
    /// Directory inside the source (or relative to the root when local)
    pub location: String,
    pub options: BTreeMap<String, String>,
}

impl ModulePath {
    pub fn parse(path: &str) -> Result<Self> {
        let parts: Vec<&str> = path.split("::").collect();
        let [source, remainder] = parts.as_slice() else {
            return Ok(Self {
                source: LOCAL_SOURCE.to_string(),
                uri: String::new(),
                location: parts.first().copied().unwrap_or_default().to_string(),
                options: BTreeMap::new(),
            });
        };

        let (uri_and_location, options) = match remainder.split_once('?') {
            Some((head, query)) => (head, parse_options(path, query)?),
            None => (*remainder, BTreeMap::new()),
        };

        // The uri keeps its own `scheme://`; a second `//` starts the location
        let segments: Vec<&str> = uri_and_location.splitn(3, "//").collect();
        let (uri, location) = match segments.as_slice() {
            [scheme, host, location] => (format!("{scheme}//{host}"), (*location).to_string()),
            [scheme, host] => (format!("{scheme}//{host}"), String::new()),
            _ => (uri_and_location.to_string(), String::new()),
        };

        Ok(Self {
            source: (*source).to_string(),
            uri,
            location,
            options,
        })
    }

    pub fn is_local(&self) -> bool {
        self.source == LOCAL_SOURCE
    }

    /// `.` or `./`, meaning the environment root itself
    pub fn is_current_dir(&self) -> bool {
        is_current_dir(&self.location)
    }
}

fn parse_options(path: &str, query: &str) -> Result<BTreeMap<String, String>> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| {
                    Error::InvalidConfig(format!(
                        "module path option \"{pair}\" in {path} is not key=value"
                    ))
                })
        })
        .collect()
}

/// Whether `path` refers to the environment root
pub fn is_current_dir(path: &str) -> bool {
    path == "." || path == "./" || path == format!(".{}", std::path::MAIN_SEPARATOR)
}

/// Fetches remote module sources into local directories
pub trait SourceFetcher: Send + Sync {
    /// Return the local directory holding `path.location`
    fn fetch(&self, path: &ModulePath) -> anyhow::Result<PathBuf>;
}

/// Fetcher for runs where every module is local
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalOnly;

impl SourceFetcher for LocalOnly {
    fn fetch(&self, path: &ModulePath) -> anyhow::Result<PathBuf> {
        anyhow::bail!("remote module source \"{}\" is not supported", path.source)
    }
}

/// Resolve a module `path` to the directory the driver runs in
pub fn resolve_module_root(
    path: &str,
    env_root: &Path,
    fetcher: &dyn SourceFetcher,
) -> Result<PathBuf> {
    let parsed = ModulePath::parse(path)?;
    if parsed.is_local() {
        if parsed.is_current_dir() {
            return Ok(env_root.to_path_buf());
        }
        return Ok(env_root.join(&parsed.location));
    }

    log::debug!("Fetching {} module source {}", parsed.source, parsed.uri);
    fetcher.fetch(&parsed).map_err(|source| Error::Source {
        path: path.to_string(),
        source,
    })
}
