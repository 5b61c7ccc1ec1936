//! Documents returned by a store and records submitted to it

use crate::{Error, FieldValue, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Name of the server-assigned creation timestamp
pub const CREATED_AT: &str = "createdAt";

/// Named field values of a document
pub type Fields = BTreeMap<String, FieldValue>;

/// Generate a fresh document id
pub fn new_document_id() -> String {
    Uuid::new_v4().to_string()
}

/// A document in a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Unique within its collection
    pub id: String,

    /// Assigned by the store; `None` on a local echo of a fresh insert
    pub created_at: Option<DateTime<Utc>>,

    /// Everything else (title, content, counters, ...)
    #[serde(default)]
    pub fields: Fields,
}

impl FeedItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: None,
            fields: Fields::new(),
        }
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    /// Look up a field, resolving `createdAt` to the server timestamp
    pub fn get(&self, field: &str) -> Option<FieldValue> {
        if field == CREATED_AT {
            return self.created_at.map(FieldValue::Timestamp);
        }
        self.fields.get(field).cloned()
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        let field = field.into();
        let value = value.into();
        if field == CREATED_AT {
            self.created_at = value.as_timestamp();
        } else {
            self.fields.insert(field, value);
        }
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(FieldValue::as_str)
    }

    /// Current value of a numeric counter; a missing counter reads as zero
    pub fn counter(&self, name: &str) -> i64 {
        self.fields
            .get(name)
            .and_then(FieldValue::as_i64)
            .unwrap_or(0)
    }
}

/// Field values submitted for insertion.
///
/// Any `createdAt` value is ignored by stores; the timestamp is theirs to assign.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub fields: Fields,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Build a record from a flat JSON object of scalars
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(map) = value else {
            return Err(Error::InvalidRecord("expected a JSON object".into()));
        };

        let mut fields = Fields::new();
        for (key, raw) in map {
            let value = FieldValue::from_json(raw).ok_or_else(|| {
                Error::InvalidRecord(format!("field '{}' is not a scalar", key))
            })?;
            fields.insert(key, value);
        }

        Ok(Self { fields })
    }

    /// Materialize the stored document for this record
    pub fn into_item(mut self, id: impl Into<String>, created_at: Option<DateTime<Utc>>) -> FeedItem {
        self.fields.remove(CREATED_AT);
        FeedItem {
            id: id.into(),
            created_at,
            fields: self.fields,
        }
    }
}

impl From<Fields> for Record {
    fn from(fields: Fields) -> Self {
        Self { fields }
    }
}
