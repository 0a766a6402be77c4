//! Configuration resolution
//!
//! Values come from a [`ConfigSource`] and are resolved through a
//! [`ConfigResolver`], which scopes keys by stack namespace and fails fast on
//! missing required keys. All configuration a program needs should be resolved
//! before a graph is applied, so a run never provisions half a topology and
//! then stops on a value that could have been checked up front.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

/// External key/value source of configuration
pub trait ConfigSource: Send + Sync {
    /// Look up a fully qualified key
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory configuration, mostly for tests and programmatic stacks
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    values: BTreeMap<String, String>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl From<BTreeMap<String, String>> for MapSource {
    fn from(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }
}

impl ConfigSource for MapSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Configuration from environment variables
///
/// `ip-cidr` under prefix `UMAMI` is read from `UMAMI_IP_CIDR`; a namespace
/// separator `:` also becomes `_`.
#[derive(Debug, Clone)]
pub struct EnvSource {
    prefix: String,
}

impl EnvSource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Environment variable name for a key
    pub fn var_name(&self, key: &str) -> String {
        let key: String = key
            .chars()
            .map(|c| match c {
                '-' | ':' | '.' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        if self.prefix.is_empty() {
            key
        } else {
            format!("{}_{}", self.prefix, key)
        }
    }
}

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(self.var_name(key)).ok()
    }
}

/// Several sources consulted in order; the first that has a key wins
#[derive(Default)]
pub struct LayeredSource {
    layers: Vec<Box<dyn ConfigSource>>,
}

impl LayeredSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, source: impl ConfigSource + 'static) -> Self {
        self.layers.push(Box::new(source));
        self
    }
}

impl ConfigSource for LayeredSource {
    fn get(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }
}

/// A configuration value as resolved for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub key: String,
    pub required: bool,
    /// `None` when an optional key fell back to its default
    pub value: Option<String>,
}

/// Resolves typed configuration values within a stack namespace
///
/// Every lookup is recorded, so callers can report exactly which values a run
/// used.
pub struct ConfigResolver<'a> {
    source: &'a dyn ConfigSource,
    namespace: String,
    entries: Mutex<Vec<ConfigEntry>>,
}

impl<'a> ConfigResolver<'a> {
    /// Resolver for the default (empty) namespace
    pub fn new(source: &'a dyn ConfigSource) -> Self {
        Self::with_namespace(source, "")
    }

    pub fn with_namespace(source: &'a dyn ConfigSource, namespace: impl Into<String>) -> Self {
        Self {
            source,
            namespace: namespace.into(),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Fully qualified key: `namespace:key`, or `key` in the default namespace
    pub fn qualify(&self, key: &str) -> String {
        if self.namespace.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.namespace, key)
        }
    }

    /// Value of a required key
    pub fn require(&self, key: &str) -> Result<String> {
        let qualified = self.qualify(key);
        let value = self.source.get(&qualified);
        self.track(&qualified, true, value.clone());
        value.ok_or(Error::MissingConfig { key: qualified })
    }

    /// Value of a required key, parsed
    pub fn require_as<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.require(key)?;
        parse_value(&self.qualify(key), &raw)
    }

    /// Value of an optional key, or `default`
    pub fn optional(&self, key: &str, default: &str) -> String {
        let qualified = self.qualify(key);
        let value = self.source.get(&qualified);
        self.track(&qualified, false, value.clone());
        value.unwrap_or_else(|| default.to_string())
    }

    /// Value of an optional key, parsed, or `default`
    ///
    /// A present but unparseable value is still an error.
    pub fn optional_as<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let qualified = self.qualify(key);
        let value = self.source.get(&qualified);
        self.track(&qualified, false, value.clone());
        match value {
            Some(raw) => parse_value(&qualified, &raw),
            None => Ok(default),
        }
    }

    /// Contents of the file named by a required key
    pub fn require_file(&self, key: &str) -> Result<String> {
        let path = self.require(key)?;
        read_file(Path::new(&path))
    }

    /// Entries resolved so far, in lookup order
    pub fn entries(&self) -> Vec<ConfigEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn track(&self, key: &str, required: bool, value: Option<String>) {
        let entry = ConfigEntry {
            key: key.to_string(),
            required,
            value,
        };
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| Error::InvalidConfig {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Read a file named by configuration, trimming surrounding whitespace
pub fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map(|content| content.trim().to_string())
        .map_err(|source| Error::FileRead {
            path: path.to_path_buf(),
            source,
        })
}
