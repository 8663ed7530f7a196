use std::fmt;

use serde::{Deserialize, Serialize};

/// A dotted name, spec.md §3: `Identifier{name, path?}` — e.g.
/// `alias.field.nested`. `path` holds every segment but the last; `name` is
/// the last segment. A bare `field` is `path: []`.
#[derive(Debug, PartialEq, Eq, Clone, Hash, Serialize, Deserialize)]
pub struct Ident {
    pub path: Vec<String>,
    pub name: String,
}

impl Ident {
    pub fn from_name<S: ToString>(name: S) -> Self {
        Ident {
            path: Vec::new(),
            name: name.to_string(),
        }
    }

    /// Builds an `Ident` from a non-empty dotted path, e.g.
    /// `["alias", "field", "nested"]`.
    pub fn from_path(mut parts: Vec<String>) -> Self {
        let name = parts.pop().expect("ident path must be non-empty");
        Ident { path: parts, name }
    }

    pub fn segments(&self) -> impl Iterator<Item = &String> {
        self.path.iter().chain(std::iter::once(&self.name))
    }

    pub fn is_qualified(&self) -> bool {
        !self.path.is_empty()
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.path {
            write!(f, "{part}.")?;
        }
        write!(f, "{}", self.name)
    }
}
