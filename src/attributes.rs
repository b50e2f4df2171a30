//! Attribute source resolution
//!
//! The attribute source is either an `http(s)://` URL, fetched without
//! authentication, or a local path. Every failure is classified so the
//! user gets a message they can act on.

use serde_json::{Map, Value};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use thiserror::Error;

use crate::config::expand;

/// Exit code for every attribute source failure
pub const EXIT_CODE: u8 = 2;

/// Errors raised while resolving the attribute source
#[derive(Debug, Error)]
pub enum AttributeError {
    #[error("I cannot connect to {location}")]
    Connection { location: String },

    #[error("I cannot find {location}")]
    NotFound { location: String },

    #[error("Permissions are incorrect on {location}. Please chmod a+r {location}")]
    Permission { location: String },

    #[error("Could not parse the provided JSON file ({location})!: {message}")]
    Parse { location: String, message: String },

    #[error("Got an unexpected error reading {location}: {message}")]
    Unexpected { location: String, message: String },
}

/// Transport-level failure of a remote fetch
#[derive(Debug, Error)]
pub enum FetchError {
    /// The endpoint could not be reached at all
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("{0}")]
    Other(String),
}

impl From<ureq::Error> for FetchError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::HostNotFound
            | ureq::Error::ConnectionFailed
            | ureq::Error::Io(_)
            | ureq::Error::Timeout(_) => Self::Connect(err.to_string()),
            ureq::Error::StatusCode(code) => Self::Other(format!("HTTP {code}")),
            other => Self::Other(other.to_string()),
        }
    }
}

/// Where attribute bytes come from
pub trait Transport {
    /// Fetch a remote document
    fn fetch(&self, url: &str) -> Result<Box<dyn Read>, FetchError>;

    /// Open a local file
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read>>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn fetch(&self, url: &str) -> Result<Box<dyn Read>, FetchError> {
        (**self).fetch(url)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read>> {
        (**self).open(path)
    }
}

/// Unauthenticated HTTP plus the local filesystem
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str) -> Result<Box<dyn Read>, FetchError> {
        let response = self
            .agent
            .get(url)
            .header("Accept", "application/json")
            .header("User-Agent", concat!("deploy-app/", env!("CARGO_PKG_VERSION")))
            .call()?;
        Ok(Box::new(response.into_body().into_reader()))
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read>> {
        Ok(Box::new(File::open(path)?))
    }
}

/// Resolves the configured attribute source into an attribute map
pub struct AttributeResolver<T: Transport = HttpTransport> {
    transport: T,
}

impl<T: Transport> AttributeResolver<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Resolve `source`; `None` means no attributes to merge
    pub fn resolve(&self, source: Option<&str>) -> Result<Option<Map<String, Value>>, AttributeError> {
        let Some(source) = source else {
            return Ok(None);
        };
        log::debug!("Loading attributes from {source}");

        let bytes = self.read(source)?;
        parse(source, &bytes).map(Some)
    }

    /// Read all bytes; the reader is released before returning
    fn read(&self, source: &str) -> Result<Vec<u8>, AttributeError> {
        let mut reader = if is_url(source) {
            self.transport
                .fetch(source)
                .map_err(|e| classify_fetch(source, e))?
        } else {
            self.transport
                .open(&expand(source))
                .map_err(|e| classify_io(source, &e))?
        };

        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| AttributeError::Unexpected {
                location: source.to_string(),
                message: e.to_string(),
            })?;
        Ok(bytes)
    }
}

pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn classify_fetch(source: &str, err: FetchError) -> AttributeError {
    let location = source.to_string();
    match err {
        FetchError::Connect(detail) => {
            log::debug!("Connection to {source} failed: {detail}");
            AttributeError::Connection { location }
        }
        FetchError::Other(message) => AttributeError::Unexpected { location, message },
    }
}

fn classify_io(source: &str, err: &io::Error) -> AttributeError {
    let location = source.to_string();
    match err.kind() {
        io::ErrorKind::NotFound => AttributeError::NotFound { location },
        io::ErrorKind::PermissionDenied => AttributeError::Permission { location },
        _ => AttributeError::Unexpected {
            location,
            message: err.to_string(),
        },
    }
}

fn parse(source: &str, bytes: &[u8]) -> Result<Map<String, Value>, AttributeError> {
    let parse_error = |message: String| AttributeError::Parse {
        location: source.to_string(),
        message,
    };

    match serde_json::from_slice::<Value>(bytes).map_err(|e| parse_error(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(parse_error(format!(
            "expected a JSON object at the top level, found {}",
            kind_of(&other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
