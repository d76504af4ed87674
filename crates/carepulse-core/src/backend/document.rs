//! Document, query and file types shared by every backend.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute map of a document.
pub type Fields = serde_json::Map<String, Value>;

/// System attribute holding the creation timestamp.
pub const CREATED_AT: &str = "$createdAt";
/// System attribute holding the last update timestamp.
pub const UPDATED_AT: &str = "$updatedAt";

/// A stored document: system attributes plus user attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "$createdAt")]
    pub created_at: String,
    #[serde(rename = "$updatedAt")]
    pub updated_at: String,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Document {
    /// Decode into a typed record (system attributes included).
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(self)?)
    }
}

/// Serialize a record into document attributes.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(<serde_json::Error as serde::ser::Error>::custom(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

/// One page of a list call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentList {
    pub documents: Vec<Document>,
    pub total: u64,
}

/// Attribute filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Attribute equals any of the values.
    Equal { attribute: String, values: Vec<Value> },
}

/// Sort order on one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Order {
    Asc(String),
    Desc(String),
}

/// Filters, ordering and paging for `DocumentStore::list_documents`.
///
/// Without a limit every matching document is returned.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListQuery {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<u32>,
    /// Matches to skip before the first returned document
    pub offset: Option<u32>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equal(mut self, attribute: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Equal {
            attribute: attribute.to_string(),
            values: vec![value.into()],
        });
        self
    }

    pub fn order_desc(mut self, attribute: &str) -> Self {
        self.order = Some(Order::Desc(attribute.to_string()));
        self
    }

    pub fn order_asc(mut self, attribute: &str) -> Self {
        self.order = Some(Order::Asc(attribute.to_string()));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Metadata of a stored file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "bucketId")]
    pub bucket_id: String,
    pub name: String,
    #[serde(rename = "sizeOriginal")]
    pub size_bytes: u64,
    #[serde(rename = "$createdAt")]
    pub created_at: String,
}
