//! Query key definitions.
//!
//! A [`QueryKey`] is an ordered list of segments. Keys compare structurally and
//! one key matches another when it is a prefix of it, which is what bulk
//! invalidation is built on.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::application::repos::ProductQueryFilter;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeySegment {
    Text(String),
    Id(u64),
}

impl From<&str> for KeySegment {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<u64> for KeySegment {
    fn from(value: u64) -> Self {
        Self::Id(value)
    }
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    pub fn root(segment: impl Into<KeySegment>) -> Self {
        Self(vec![segment.into()])
    }

    /// Returns a new key with `segment` appended.
    pub fn join(&self, segment: impl Into<KeySegment>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    /// `true` when `prefix` equals this key or is a leading sub-sequence of it.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl<S: Into<KeySegment>> FromIterator<S> for QueryKey {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (index, segment) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{segment}")?;
        }
        f.write_str("]")
    }
}

/// Key factory for one entity type.
///
/// ```text
/// all      = [root]
/// lists    = [root, "list"]
/// list(f)  = [root, "list", hash(f)]
/// details  = [root, "detail"]
/// detail(i)= [root, "detail", i]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyFamily {
    root: &'static str,
}

pub const PRODUCTS: KeyFamily = KeyFamily::new("products");
pub const CATEGORIES: KeyFamily = KeyFamily::new("categories");

impl KeyFamily {
    pub const fn new(root: &'static str) -> Self {
        Self { root }
    }

    /// `true` for every key built by this family.
    pub fn contains(&self, key: &QueryKey) -> bool {
        key.starts_with(&self.all())
    }

    pub fn all(&self) -> QueryKey {
        QueryKey::root(self.root)
    }

    /// Key of the unfiltered collection, and prefix of every filtered one.
    pub fn lists(&self) -> QueryKey {
        self.all().join("list")
    }

    pub fn list<F: Hash>(&self, filter: &F) -> QueryKey {
        self.lists().join(hash_value(filter))
    }

    pub fn details(&self) -> QueryKey {
        self.all().join("detail")
    }

    pub fn detail(&self, id: u64) -> QueryKey {
        self.details().join(id)
    }
}

/// Key of a (possibly filtered) product listing.
pub fn product_list(filter: &ProductQueryFilter) -> QueryKey {
    if filter.is_empty() {
        PRODUCTS.lists()
    } else {
        PRODUCTS.list(filter)
    }
}

/// Compute a hash for any hashable value.
fn hash_value<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}
