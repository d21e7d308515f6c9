//! Entity and query identity.
//!
//! A query is identified by the pair of its owning entity and its name.
//! Template text never takes part in identity.

use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Identifier of a logical entity, usually a fully-qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(Arc<str>);

impl EntityKey {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Name of a query, unique only within its entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryName(Arc<str>);

impl QueryName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueryName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Composite `(entity, query)` identity used by the registry and the
/// template cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    pub entity: EntityKey,
    pub query: QueryName,
}

impl QueryKey {
    pub fn new(entity: impl Into<EntityKey>, query: impl Into<QueryName>) -> Self {
        Self {
            entity: entity.into(),
            query: query.into(),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.entity, self.query)
    }
}

/// A named SQL template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueryDefinition {
    pub name: String,
    #[serde(alias = "template")]
    pub sql: String,
}

impl QueryDefinition {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
        }
    }
}

/// A decoded entity with its queries, as produced by a decoder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    #[serde(default)]
    pub queries: Vec<QueryDefinition>,
}

impl EntityDefinition {
    pub fn new(name: impl Into<String>, queries: Vec<QueryDefinition>) -> Self {
        Self {
            name: name.into(),
            queries,
        }
    }
}
