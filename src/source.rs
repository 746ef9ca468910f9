//! Report bundle access: a local directory or (with the `http` feature) a URL

use crate::{FieldKey, ReportError};
use std::path::{Component, Path, PathBuf};

pub const SUMMARY_FILE: &str = "summary.json";
pub const ANNOTATIONS_FILE: &str = "annotations.json";

/// Failure to retrieve one document of a report bundle
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0}: not found")]
    NotFound(String),
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{url}: HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("{url}: {message}")]
    Request { url: String, message: String },
}

/// A report bundle: `summary.json`, `annotations.json` and one document per
/// test field at `<test id>/<field name>`
pub trait ReportSource {
    /// Fetch a document by path relative to the bundle root
    fn fetch(&self, path: &str) -> Result<String, FetchError>;

    /// Human-readable location for messages
    fn location(&self) -> String;

    /// URL a browser resolves bundle paths against, with a trailing slash
    fn base_url(&self) -> String {
        format!("{}/", self.location().trim_end_matches('/'))
    }

    fn summary(&self) -> Result<String, FetchError> {
        self.fetch(SUMMARY_FILE)
    }

    fn annotations(&self) -> Result<String, FetchError> {
        self.fetch(ANNOTATIONS_FILE)
    }

    fn field(&self, key: &FieldKey) -> Result<String, FetchError> {
        self.fetch(&key.path())
    }
}

/// Report bundle in a local directory
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ReportSource for DirSource {
    fn fetch(&self, path: &str) -> Result<String, FetchError> {
        // only plain names below the root; `..`, roots and prefixes never resolve
        let relative = Path::new(path);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(FetchError::NotFound(path.to_string()));
        }
        let full = self.root.join(relative);
        match std::fs::read(&full) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FetchError::NotFound(full.display().to_string()))
            }
            Err(source) => Err(FetchError::Io {
                path: full.display().to_string(),
                source,
            }),
        }
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn base_url(&self) -> String {
        let root = self
            .root
            .canonicalize()
            .unwrap_or_else(|_| self.root.clone());
        let mut url = String::from("file://");
        for c in root.display().to_string().replace('\\', "/").chars() {
            match c {
                '%' => url.push_str("%25"),
                ' ' => url.push_str("%20"),
                '#' => url.push_str("%23"),
                '?' => url.push_str("%3F"),
                _ => url.push(c),
            }
        }
        if !url.ends_with('/') {
            url.push('/');
        }
        url
    }
}

/// Report bundle served over HTTP
#[cfg(feature = "http")]
pub struct HttpSource {
    base: String,
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpSource {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

#[cfg(feature = "http")]
impl ReportSource for HttpSource {
    fn fetch(&self, path: &str) -> Result<String, FetchError> {
        let url = format!("{}/{}", self.base, path);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| FetchError::Request {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }
        response.text().map_err(|e| FetchError::Request {
            url,
            message: e.to_string(),
        })
    }

    fn location(&self) -> String {
        self.base.clone()
    }
}

fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Open a report location: URLs need the `http` feature, anything else is a directory
pub fn open_source(location: &str) -> Result<Box<dyn ReportSource>, ReportError> {
    if is_url(location) {
        #[cfg(feature = "http")]
        return Ok(Box::new(HttpSource::new(location)));
        #[cfg(not(feature = "http"))]
        return Err(ReportError::UnsupportedLocation(location.to_string()));
    }
    Ok(Box::new(DirSource::new(location)))
}
