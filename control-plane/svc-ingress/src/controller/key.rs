use std::fmt;
use std::str::FromStr;

use kube::Resource;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("object has no name")]
    MissingName,
    #[error("unexpected key format: {0:?}")]
    Malformed(String),
}

/// `namespace/name` address of one reconciliation unit.
///
/// Cluster-scoped objects (empty namespace) serialize to the bare name,
/// so every key parses back into exactly the parts it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn for_object<K: Resource>(obj: &K) -> Result<Self, KeyError> {
        let meta = obj.meta();
        let name = meta
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or(KeyError::MissingName)?;
        Ok(Self::new(meta.namespace.clone().unwrap_or_default(), name))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

impl FromStr for ResourceKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let (namespace, name) = match (parts.next(), parts.next(), parts.next())
        {
            (Some(name), None, None) => ("", name),
            (Some(ns), Some(name), None) => (ns, name),
            _ => return Err(KeyError::Malformed(s.to_string())),
        };
        if name.is_empty() {
            return Err(KeyError::Malformed(s.to_string()));
        }
        Ok(Self::new(namespace, name))
    }
}
