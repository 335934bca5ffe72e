//! Request classification by URL shape.

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use binsync_core::{CacheKind, Error};

/// What kind of resource a request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    Critical,
    StaticAsset,
    Api,
    DataFile,
    Image,
    Other,
}

/// How a class of request is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
    /// Cache-first that answers with a placeholder instead of failing.
    Image,
}

impl RequestClass {
    /// Strategy and cache each class dispatches to.
    pub fn dispatch(self) -> (StrategyKind, CacheKind) {
        match self {
            RequestClass::Critical => (StrategyKind::CacheFirst, CacheKind::Critical),
            RequestClass::StaticAsset => (StrategyKind::CacheFirst, CacheKind::Static),
            RequestClass::Api => (StrategyKind::NetworkFirst, CacheKind::Data),
            RequestClass::DataFile => (StrategyKind::StaleWhileRevalidate, CacheKind::Data),
            RequestClass::Image => (StrategyKind::Image, CacheKind::Image),
            RequestClass::Other => (StrategyKind::NetworkFirst, CacheKind::Data),
        }
    }
}

/// Path rules for each class. Extensions are matched case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierRules {
    pub critical_paths: Vec<String>,
    pub api_prefixes: Vec<String>,
    pub image_extensions: Vec<String>,
    pub static_extensions: Vec<String>,
    pub static_prefixes: Vec<String>,
    pub data_extensions: Vec<String>,
    pub data_prefixes: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            critical_paths: strings(&["/", "/index.html", "/offline.html", "/manifest.json"]),
            api_prefixes: strings(&["/api/"]),
            image_extensions: strings(&["png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "avif"]),
            static_extensions: strings(&["js", "css", "woff", "woff2", "ttf", "otf"]),
            static_prefixes: strings(&["/assets/", "/static/"]),
            data_extensions: strings(&["json", "csv", "xml"]),
            data_prefixes: strings(&["/data/"]),
        }
    }
}

/// Compile an extension list into one case-insensitive suffix pattern.
/// An empty list compiles to `None` and matches nothing.
fn extension_pattern(extensions: &[String]) -> Result<Option<Regex>, Error> {
    let alternatives: Vec<String> =
        extensions.iter().map(|e| regex::escape(e.trim_start_matches('.'))).filter(|e| !e.is_empty()).collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    Regex::new(&format!(r"(?i)\.(?:{})$", alternatives.join("|")))
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("bad extension list: {e}")))
}

fn matches_ext(pattern: &Option<Regex>, path: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(path))
}

fn has_prefix(prefixes: &[String], path: &str) -> bool {
    prefixes.iter().any(|p| path.starts_with(p.as_str()))
}

/// Compiled classification rules.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: ClassifierRules,
    image_ext: Option<Regex>,
    static_ext: Option<Regex>,
    data_ext: Option<Regex>,
}

impl Classifier {
    pub fn new(rules: ClassifierRules) -> Result<Self, Error> {
        Ok(Self {
            image_ext: extension_pattern(&rules.image_extensions)?,
            static_ext: extension_pattern(&rules.static_extensions)?,
            data_ext: extension_pattern(&rules.data_extensions)?,
            rules,
        })
    }

    /// Classify by path. Precedence: critical, API, image, static, data file, other.
    pub fn classify(&self, url: &Url) -> RequestClass {
        let path = url.path();
        if self.rules.critical_paths.iter().any(|p| p == path) {
            RequestClass::Critical
        } else if has_prefix(&self.rules.api_prefixes, path) {
            RequestClass::Api
        } else if matches_ext(&self.image_ext, path) {
            RequestClass::Image
        } else if matches_ext(&self.static_ext, path) || has_prefix(&self.rules.static_prefixes, path) {
            RequestClass::StaticAsset
        } else if matches_ext(&self.data_ext, path) || has_prefix(&self.rules.data_prefixes, path) {
            RequestClass::DataFile
        } else {
            RequestClass::Other
        }
    }
}
