use std::fmt;
use std::str::FromStr;

use bson::oid::ObjectId;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::error::StoreError;

/// Identifier of a stored todo: the document's ObjectId, exchanged as 24 hex characters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct TodoId(pub ObjectId);

impl Default for TodoId {
    fn default() -> Self { Self(ObjectId::new()) }
}

impl FromStr for TodoId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectId::parse_str(s)
            .map(TodoId)
            .map_err(|_| StoreError::InvalidId(s.to_string()))
    }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0.to_hex()) }
}

impl From<ObjectId> for TodoId {
    fn from(oid: ObjectId) -> Self { Self(oid) }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// `None` until the todo has been persisted.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TodoId>,
    pub text: String,
    #[serde(default)]
    pub is_done: bool,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    pub fn new(text: impl Into<String>) -> Self {
        let now = now();
        Self { id: None, text: text.into(), is_done: false, created_at: now, updated_at: now }
    }

    /// Drops sub-millisecond precision so the value equals what BSON stores.
    pub(crate) fn normalized(mut self) -> Self {
        self.created_at = self.created_at.trunc_subsecs(3);
        self.updated_at = self.updated_at.trunc_subsecs(3);
        self
    }
}

/// Current time at the precision BSON datetimes hold.
pub(crate) fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(3) }
