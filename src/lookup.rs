//! Application record lookup
//!
//! Records live in the `apps` collection, either behind the server's
//! search endpoint or as JSON files in a local data bag directory.

use anyhow::{Context, Result, bail};
use converge::ApplicationRecord;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// Collection holding application records
pub const APPS: &str = "apps";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("Cannot find an application named {0}")]
    NotFound(String),
}

/// Search service for records
pub trait Lookup {
    /// First record in `collection` matching `query` (`field:value`)
    fn find(&self, collection: &str, query: &str) -> Result<Option<ApplicationRecord>>;
}

/// Look up the record for an application id
///
/// The outer error is a lookup failure; the inner one a missing record.
pub fn find_application(
    lookup: &dyn Lookup,
    id: &str,
) -> Result<std::result::Result<ApplicationRecord, LookupError>> {
    let query = format!("id:{id}");
    log::debug!("Searching {APPS} for {query}");
    Ok(lookup
        .find(APPS, &query)?
        .ok_or_else(|| LookupError::NotFound(id.to_string())))
}

fn split_query(query: &str) -> Result<(&str, &str)> {
    match query.split_once(':') {
        Some((field, value)) if !field.is_empty() => Ok((field, value)),
        _ => bail!("Unsupported query {query:?}, expected field:value"),
    }
}

// ============================================================================
// Server search
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    rows: Vec<Value>,
}

/// Search endpoint of the managed server (`GET <server>/search/<collection>?q=`)
pub struct ServerLookup {
    agent: ureq::Agent,
    server_url: String,
}

impl ServerLookup {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            server_url: server_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn search_url(&self, collection: &str) -> String {
        format!("{}/search/{}", self.server_url, collection)
    }
}

impl Lookup for ServerLookup {
    fn find(&self, collection: &str, query: &str) -> Result<Option<ApplicationRecord>> {
        let url = self.search_url(collection);
        let response = self
            .agent
            .get(&url)
            .query("q", query)
            .header("Accept", "application/json")
            .call();

        let mut response = match response {
            Ok(response) => response,
            Err(ureq::Error::StatusCode(404)) => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Search request to {url} failed")),
        };
        let body: SearchResponse = response
            .body_mut()
            .read_json()
            .with_context(|| format!("Invalid search response from {url}"))?;

        first_record(body.rows)
    }
}

/// Rows may wrap the record in `raw_data`
fn first_record(rows: Vec<Value>) -> Result<Option<ApplicationRecord>> {
    let Some(mut row) = rows.into_iter().next() else {
        return Ok(None);
    };
    if let Some(raw) = row.get_mut("raw_data").map(Value::take) {
        row = raw;
    }
    let record = serde_json::from_value(row).context("Invalid application record")?;
    Ok(Some(record))
}

// ============================================================================
// Data bag directory
// ============================================================================

/// Records stored as `<root>/<collection>/*.json`
pub struct DirectoryLookup {
    root: PathBuf,
}

impl DirectoryLookup {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Lookup for DirectoryLookup {
    fn find(&self, collection: &str, query: &str) -> Result<Option<ApplicationRecord>> {
        let (field, wanted) = split_query(query)?;
        let dir = self.root.join(collection);
        if !dir.is_dir() {
            log::debug!("No data bag directory at {}", dir.display());
            return Ok(None);
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&dir)
            .with_context(|| format!("Could not read {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        for path in files {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Could not read {}", path.display()))?;
            let value: Value = serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?;

            let matches = match value.get(field) {
                Some(Value::String(s)) => s == wanted,
                Some(other) => other.to_string() == wanted,
                None => false,
            };
            if matches {
                let record = serde_json::from_value(value)
                    .with_context(|| format!("Invalid application record in {}", path.display()))?;
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

// ============================================================================
// Tests
// ============================================================================

/// In-memory lookup that counts calls
#[cfg(test)]
#[derive(Default)]
pub struct StaticLookup {
    pub records: Vec<ApplicationRecord>,
    pub calls: std::cell::Cell<usize>,
}

#[cfg(test)]
impl StaticLookup {
    pub fn with(records: Vec<ApplicationRecord>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }
}

#[cfg(test)]
impl Lookup for StaticLookup {
    fn find(&self, _collection: &str, query: &str) -> Result<Option<ApplicationRecord>> {
        self.calls.set(self.calls.get() + 1);
        let (_, id) = split_query(query)?;
        Ok(self.records.iter().find(|r| r.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_app(dir: &std::path::Path, name: &str, value: &Value) {
        let apps = dir.join(APPS);
        fs::create_dir_all(&apps).unwrap();
        fs::write(apps.join(format!("{name}.json")), value.to_string()).unwrap();
    }

    #[test]
    fn test_directory_lookup_finds_by_id() {
        let dir = tempfile::tempdir().unwrap();
        write_app(
            dir.path(),
            "web",
            &json!({"id": "web", "server_roles": ["frontend"], "type": {"frontend": ["nginx"]}}),
        );
        write_app(dir.path(), "api", &json!({"id": "api"}));

        let lookup = DirectoryLookup::new(dir.path());
        let app = find_application(&lookup, "web").unwrap().unwrap();
        assert_eq!(app.server_roles, vec!["frontend"]);
    }

    #[test]
    fn test_directory_lookup_not_found() {
        let dir = tempfile::tempdir().unwrap();
        write_app(dir.path(), "api", &json!({"id": "api"}));

        let lookup = DirectoryLookup::new(dir.path());
        let err = find_application(&lookup, "ghost").unwrap().unwrap_err();
        assert_eq!(err.to_string(), "Cannot find an application named ghost");
    }

    #[test]
    fn test_directory_lookup_missing_collection() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = DirectoryLookup::new(dir.path());
        assert!(lookup.find(APPS, "id:web").unwrap().is_none());
    }

    #[test]
    fn test_directory_lookup_rejects_bad_query() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = DirectoryLookup::new(dir.path());
        assert!(lookup.find(APPS, "web").is_err());
    }

    #[test]
    fn test_first_record_unwraps_raw_data() {
        let rows = vec![
            json!({"name": "data_bag_item_apps_web", "raw_data": {"id": "web", "server_roles": ["db"]}}),
            json!({"id": "other"}),
        ];
        let app = first_record(rows).unwrap().unwrap();
        assert_eq!(app.id, "web");
        assert_eq!(app.server_roles, vec!["db"]);
    }

    #[test]
    fn test_first_record_empty() {
        assert!(first_record(vec![]).unwrap().is_none());
    }

    #[test]
    fn test_search_url() {
        let lookup = ServerLookup::new("https://chef.example.com/");
        assert_eq!(
            lookup.search_url(APPS),
            "https://chef.example.com/search/apps"
        );
    }
}
