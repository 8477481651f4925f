//! Transport-neutral request view: identification strategies see host, path,
//! headers, and query params, never the raw transport object.

use std::collections::HashMap;

#[derive(Clone, Debug, Default)]
pub struct RequestView {
    /// Host as sent by the client, possibly with a port.
    pub host: Option<String>,
    /// URI path, leading slash included.
    pub path: String,
    /// Header names lowercased.
    headers: HashMap<String, String>,
    query: HashMap<String, String>,
}

impl RequestView {
    pub fn new(host: Option<impl Into<String>>, path: impl Into<String>) -> Self {
        RequestView {
            host: host.map(Into::into),
            path: path.into(),
            headers: HashMap::new(),
            query: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Non-empty path segments, in order.
    pub fn path_segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }
}
