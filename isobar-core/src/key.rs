//! Cache key construction.
//!
//! A `CacheKey` is an opaque string naming a query's full identity. Keys
//! built through [`CacheKeyBuilder`] join a namespace and its parameters
//! with `|`, escaping the separator inside parameters, so that distinct
//! parameter lists never collapse to the same key and a family of keys can
//! be addressed by a common prefix.

use std::fmt;

/// Separator between key segments.
pub const SEPARATOR: char = '|';
const ESCAPE: char = '\\';

/// Opaque identity of a cached query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an already-formed key string verbatim.
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Start a segmented key under `namespace`.
    pub fn builder(namespace: impl AsRef<str>) -> CacheKeyBuilder {
        CacheKeyBuilder::new(namespace)
    }

    /// Prefix matching every key built from `namespace` followed by `params`.
    ///
    /// The returned prefix always ends with the separator, so `"summary"`
    /// never matches keys of a `"summary-v2"` namespace.
    pub fn prefix<I, S>(namespace: impl AsRef<str>, params: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = CacheKeyBuilder::new(namespace);
        for param in params {
            builder = builder.param(param);
        }
        let mut prefix = builder.build().0;
        prefix.push(SEPARATOR);
        prefix
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::raw(key)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self::raw(key)
    }
}

/// Builder for segmented cache keys.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    key: String,
}

impl CacheKeyBuilder {
    pub fn new(namespace: impl AsRef<str>) -> Self {
        let mut key = String::new();
        push_escaped(&mut key, namespace.as_ref());
        Self { key }
    }

    /// Append one parameter segment.
    pub fn param(mut self, value: impl AsRef<str>) -> Self {
        self.key.push(SEPARATOR);
        push_escaped(&mut self.key, value.as_ref());
        self
    }

    /// Append an optional parameter; `None` is encoded as an empty segment.
    pub fn opt_param(self, value: Option<impl AsRef<str>>) -> Self {
        match value {
            Some(value) => self.param(value),
            None => self.param(""),
        }
    }

    pub fn build(self) -> CacheKey {
        CacheKey(self.key)
    }
}

fn push_escaped(out: &mut String, segment: &str) {
    for ch in segment.chars() {
        if ch == SEPARATOR || ch == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(ch);
    }
}
