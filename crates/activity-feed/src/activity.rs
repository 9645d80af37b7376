//! Activity records as seen by the ordering functions.
//!
//! Only three fields matter for ordering: a globally unique `id`, a coarse
//! `timestamp` that may move when a pending activity confirms, and the
//! pending flag. Everything else is payload carried through untouched.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Read access to the fields that determine an activity's position.
pub trait Activity {
    /// Globally unique identifier, also the final tie-break.
    fn id(&self) -> &str;

    /// Sort timestamp. Not unique, and may change once the activity confirms.
    fn timestamp(&self) -> i64;

    /// Whether the activity is still awaiting on-chain confirmation.
    fn is_pending(&self) -> bool;
}

impl<T: Activity + ?Sized> Activity for &T {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn timestamp(&self) -> i64 {
        (**self).timestamp()
    }

    fn is_pending(&self) -> bool {
        (**self).is_pending()
    }
}

impl<T: Activity + ?Sized> Activity for Arc<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn timestamp(&self) -> i64 {
        (**self).timestamp()
    }

    fn is_pending(&self) -> bool {
        (**self).is_pending()
    }
}

/// Direction of the timestamp comparison.
///
/// The id tie-break is always ascending, whatever the direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    /// Newest first. This is how feeds are rendered and how head pages arrive.
    #[default]
    Descending,
}

/// A concrete activity carrying an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord<P = ()> {
    pub id: String,
    pub timestamp: i64,
    pub is_pending: bool,
    #[serde(default)]
    pub payload: P,
}

impl<P: Default> ActivityRecord<P> {
    /// Create a confirmed record with a default payload.
    pub fn confirmed(id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            timestamp,
            is_pending: false,
            payload: P::default(),
        }
    }

    /// Create a pending record with a default payload.
    pub fn pending(id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            timestamp,
            is_pending: true,
            payload: P::default(),
        }
    }
}

impl<P> ActivityRecord<P> {
    /// Replace the payload.
    pub fn with_payload<Q>(self, payload: Q) -> ActivityRecord<Q> {
        ActivityRecord {
            id: self.id,
            timestamp: self.timestamp,
            is_pending: self.is_pending,
            payload,
        }
    }
}

impl<P> Activity for ActivityRecord<P> {
    fn id(&self) -> &str {
        &self.id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn is_pending(&self) -> bool {
        self.is_pending
    }
}
