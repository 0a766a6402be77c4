//! Property values and deferred output references
//!
//! A descriptor's inputs are [`Input`]s: either concrete [`Value`]s or
//! [`OutputRef`]s pointing at a property of another resource that only
//! exists once that resource has been created. Lists and maps may nest
//! references, so dependency inference walks the whole tree.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// Logical name of a resource, unique within a run
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reference a property this resource will report once created.
    pub fn output(&self, property: impl Into<String>) -> OutputRef {
        OutputRef::new(self.clone(), property)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ResourceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ResourceId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Deferred pointer to a property of another resource.
///
/// Holds identifiers only; the value lives in the graph's results table and is
/// looked up when the dependent resource is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputRef {
    resource: ResourceId,
    property: String,
}

impl OutputRef {
    pub fn new(resource: impl Into<ResourceId>, property: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            property: property.into(),
        }
    }

    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    pub fn property(&self) -> &str {
        &self.property
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.property)
    }
}

/// A concrete property value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// Resolved inputs or returned outputs of a resource, keyed by property name
pub type Properties = BTreeMap<String, Value>;

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Name of the variant, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key} = {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, String>> for Value {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self::Map(map.into_iter().map(|(k, v)| (k, Self::String(v))).collect())
    }
}

/// A descriptor input: a literal, an output reference, or a container of either
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Value(Value),
    Output(OutputRef),
    List(Vec<Input>),
    Map(BTreeMap<String, Input>),
}

impl Input {
    /// Every output reference embedded anywhere in this input.
    pub fn references(&self) -> Vec<&OutputRef> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, refs: &mut Vec<&'a OutputRef>) {
        match self {
            Self::Value(_) => {}
            Self::Output(r) => refs.push(r),
            Self::List(items) => {
                for item in items {
                    item.collect_references(refs);
                }
            }
            Self::Map(map) => {
                for item in map.values() {
                    item.collect_references(refs);
                }
            }
        }
    }

    /// Whether the input is a literal with no embedded references.
    pub fn is_known(&self) -> bool {
        self.references().is_empty()
    }

    /// Substitute every output reference using `lookup`.
    ///
    /// `lookup` returns `Ok(None)` for a value that is not known yet; the whole
    /// input is then unknown. Errors from `lookup` are propagated as-is.
    pub fn resolve_with<F>(&self, lookup: &mut F) -> Result<Option<Value>>
    where
        F: FnMut(&OutputRef) -> Result<Option<Value>>,
    {
        match self {
            Self::Value(v) => Ok(Some(v.clone())),
            Self::Output(r) => lookup(r),
            Self::List(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    match item.resolve_with(lookup)? {
                        Some(v) => resolved.push(v),
                        None => return Ok(None),
                    }
                }
                Ok(Some(Value::List(resolved)))
            }
            Self::Map(map) => {
                let mut resolved = BTreeMap::new();
                for (key, item) in map {
                    match item.resolve_with(lookup)? {
                        Some(v) => {
                            resolved.insert(key.clone(), v);
                        }
                        None => return Ok(None),
                    }
                }
                Ok(Some(Value::Map(resolved)))
            }
        }
    }
}

impl From<Value> for Input {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl From<OutputRef> for Input {
    fn from(r: OutputRef) -> Self {
        Self::Output(r)
    }
}

impl From<bool> for Input {
    fn from(b: bool) -> Self {
        Self::Value(b.into())
    }
}

impl From<i64> for Input {
    fn from(i: i64) -> Self {
        Self::Value(i.into())
    }
}

impl From<&str> for Input {
    fn from(s: &str) -> Self {
        Self::Value(s.into())
    }
}

impl From<String> for Input {
    fn from(s: String) -> Self {
        Self::Value(s.into())
    }
}

impl From<Vec<Input>> for Input {
    fn from(items: Vec<Input>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, Input>> for Input {
    fn from(map: BTreeMap<String, Input>) -> Self {
        Self::Map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_references_walk_nested_containers() {
        let net = ResourceId::new("net");
        let sa = ResourceId::new("sa");
        let mut map = BTreeMap::new();
        map.insert("email".to_string(), Input::from(sa.output("email")));
        let input = Input::List(vec![
            Input::from("literal"),
            Input::from(net.output("id")),
            Input::Map(map),
        ]);

        let refs: Vec<String> = input.references().iter().map(ToString::to_string).collect();
        assert_eq!(refs, vec!["net.id", "sa.email"]);
        assert!(!input.is_known());
        assert!(Input::from(42_i64).is_known());
    }

    #[test]
    fn test_resolve_substitutes_outputs() {
        let input = Input::List(vec![Input::from(OutputRef::new("net", "id")), Input::from(1_i64)]);
        let resolved = input
            .resolve_with(&mut |r| Ok(Some(Value::from(format!("{}-value", r.property())))))
            .unwrap();
        assert_eq!(
            resolved,
            Some(Value::List(vec![Value::from("id-value"), Value::Int(1)]))
        );
    }

    #[test]
    fn test_resolve_unknown_propagates() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Input::from("x"));
        map.insert("b".to_string(), Input::from(OutputRef::new("net", "id")));
        let resolved = Input::Map(map).resolve_with(&mut |_| Ok(None)).unwrap();
        assert_eq!(resolved, None);
    }

    #[test]
    fn test_resolve_error_propagates() {
        let input = Input::from(OutputRef::new("net", "id"));
        let err = input
            .resolve_with(&mut |r| {
                Err(Error::UnresolvedDependency {
                    reference: r.clone(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, Error::UnresolvedDependency { .. }));
    }

    #[test]
    fn test_value_display() {
        let mut map = BTreeMap::new();
        map.insert("env".to_string(), "cks".to_string());
        assert_eq!(Value::from(map).to_string(), r#"{env = "cks"}"#);
        assert_eq!(Value::from(vec!["22", "80"]).to_string(), r#"["22", "80"]"#);
    }
}
