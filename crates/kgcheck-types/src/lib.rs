//! # kgcheck-types: Core types for `kgcheck`
//!
//! This crate contains the types shared across the harness:
//! - Identifiers ([`CollectionName`], [`RecordId`], [`NodeId`], [`ClientId`])
//! - The set-valued record payload ([`ItemSet`]) and its codec
//! - The tagged error kind reported by the store boundary ([`ErrorKind`])
//! - The write-conflict policy of a versioned store ([`ConflictPolicy`])

use std::collections::BTreeSet;
use std::fmt::{self, Display};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;


// ============================================================================
// Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Name of a replicated, mutable collection (a "keygroup").
    CollectionName
);

string_id!(
    /// Identifier of a record within a collection.
    RecordId
);

string_id!(
    /// Identifier of a store node that can hold a replica of a collection.
    NodeId
);

string_id!(
    /// Identity of one verification client.
    ///
    /// Used as the prefix of every element the client adds, so elements are
    /// unique across clients as long as client ids are.
    ClientId
);

impl ClientId {
    /// Builds the element this client adds at the given step.
    ///
    /// ```
    /// # use kgcheck_types::ClientId;
    /// assert_eq!(ClientId::new("c1").element_for_step(3), "c1-3");
    /// ```
    pub fn element_for_step(&self, step: u64) -> String {
        format!("{}-{step}", self.0)
    }
}

// ============================================================================
// Item Set
// ============================================================================

/// A set of string items: the logical value of a record.
///
/// Backed by a `BTreeSet` so iteration, `Debug` output and the encoded form
/// are always sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemSet(BTreeSet<String>);

impl ItemSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Inserts an item, returning `true` if it was not present.
    pub fn insert(&mut self, item: impl Into<String>) -> bool {
        self.0.insert(item.into())
    }

    pub fn contains(&self, item: &str) -> bool {
        self.0.contains(item)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    /// Adds every item of `other` to this set.
    pub fn extend_from(&mut self, other: &ItemSet) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn is_subset(&self, other: &ItemSet) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Items of this set that are absent from `other`.
    pub fn difference(&self, other: &ItemSet) -> ItemSet {
        ItemSet(self.0.difference(&other.0).cloned().collect())
    }

    /// Encodes the set as a sorted JSON array of strings.
    pub fn encode(&self) -> Bytes {
        // Serializing a set of strings into a Vec cannot fail.
        let encoded = serde_json::to_vec(&self.0).unwrap_or_else(|_| b"[]".to_vec());
        Bytes::from(encoded)
    }

    /// Decodes a payload produced by [`ItemSet::encode`].
    ///
    /// A zero-length payload decodes to the empty set. Duplicate entries are
    /// collapsed.
    pub fn decode(payload: &[u8]) -> Result<ItemSet, CodecError> {
        if payload.is_empty() {
            return Ok(ItemSet::new());
        }
        let items: Vec<String> = serde_json::from_slice(payload).map_err(|source| {
            CodecError::Malformed {
                preview: preview(payload),
                source,
            }
        })?;
        Ok(items.into_iter().collect())
    }
}

impl Display for ItemSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{item:?}")?;
        }
        f.write_str("}")
    }
}

impl<S: Into<String>> FromIterator<S> for ItemSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        ItemSet(iter.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>> Extend<S> for ItemSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(Into::into));
    }
}

impl IntoIterator for ItemSet {
    type Item = String;
    type IntoIter = std::collections::btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ItemSet {
    type Item = &'a String;
    type IntoIter = std::collections::btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn preview(payload: &[u8]) -> String {
    const MAX_PREVIEW: usize = 64;
    let end = payload.len().min(MAX_PREVIEW);
    String::from_utf8_lossy(&payload[..end]).into_owned()
}

/// Errors decoding an item-set payload.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed item set payload {preview:?}: {source}")]
    Malformed {
        preview: String,
        source: serde_json::Error,
    },
}

// ============================================================================
// Error Kind
// ============================================================================

/// Classification of a failed store operation.
///
/// Produced at the store boundary so callers branch on a closed set of
/// cases instead of inspecting error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The collection or record does not exist (yet).
    NotFound,
    /// The collection already exists, or the node is already a replica.
    AlreadyExists,
    /// A write was rejected because a concurrent write invalidated it.
    Conflict,
    /// The store could not be reached or did not answer in time.
    Unavailable,
    /// Anything the store did not classify.
    Unknown,
}

impl ErrorKind {
    /// Returns true for failures that may succeed when simply retried.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::Unavailable | ErrorKind::Unknown)
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not-found",
            ErrorKind::AlreadyExists => "already-exists",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Conflict Policy
// ============================================================================

/// How a versioned store treats a write that does not supersede every
/// version currently stored for the record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Reject the write with [`ErrorKind::Conflict`].
    #[default]
    Reject,
    /// Accept the write and keep the unsuperseded versions as siblings.
    KeepSiblings,
}

impl ConflictPolicy {
    pub fn name(self) -> &'static str {
        match self {
            ConflictPolicy::Reject => "reject",
            ConflictPolicy::KeepSiblings => "keep-siblings",
        }
    }
}

impl Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reject" => Ok(ConflictPolicy::Reject),
            "keep-siblings" => Ok(ConflictPolicy::KeepSiblings),
            other => Err(format!(
                "unknown conflict policy '{other}' (expected 'reject' or 'keep-siblings')"
            )),
        }
    }
}
