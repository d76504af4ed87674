//! Document database operations.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension};
use serde_json::Value;

use super::{constraint_or, timestamp, Database, DbError, DbResult};
use crate::backend::{
    BackendResult, Document, DocumentList, DocumentStore, Fields, Filter, ListQuery, Order,
    CREATED_AT, UPDATED_AT,
};

impl Database {
    /// Insert a new document.
    pub fn insert_document(
        &self,
        collection: &str,
        id: &str,
        fields: &Fields,
    ) -> DbResult<Document> {
        let data = serde_json::to_string(&user_attributes(fields))?;
        let now = timestamp();

        self.conn
            .execute(
                r#"
                INSERT INTO documents (collection, id, data, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?4)
                "#,
                params![collection, id, data, now],
            )
            .map_err(|e| {
                constraint_or(e, || {
                    format!("document {} already exists in {}", id, collection)
                })
            })?;

        self.find_document(collection, id)?
            .ok_or_else(|| DbError::NotFound(format!("document {} in {}", id, collection)))
    }

    /// Get a document by id.
    pub fn find_document(&self, collection: &str, id: &str) -> DbResult<Option<Document>> {
        self.conn
            .query_row(
                r#"
                SELECT id, data, created_at, updated_at
                FROM documents
                WHERE collection = ? AND id = ?
                "#,
                [collection, id],
                |row| {
                    Ok(DocumentRow {
                        id: row.get(0)?,
                        data: row.get(1)?,
                        created_at: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Overwrite attributes of an existing document. `null` attributes are removed.
    ///
    /// Returns `None` if the document does not exist.
    pub fn patch_document(
        &self,
        collection: &str,
        id: &str,
        fields: &Fields,
    ) -> DbResult<Option<Document>> {
        let patch = serde_json::to_string(&user_attributes(fields))?;

        let rows_affected = self.conn.execute(
            r#"
            UPDATE documents SET
                data = json_patch(data, ?3),
                updated_at = ?4
            WHERE collection = ?1 AND id = ?2
            "#,
            params![collection, id, patch, timestamp()],
        )?;

        if rows_affected == 0 {
            return Ok(None);
        }
        self.find_document(collection, id)
    }

    /// List documents matching a query.
    pub fn query_documents(&self, collection: &str, query: &ListQuery) -> DbResult<DocumentList> {
        let mut params = vec![SqlValue::Text(collection.to_string())];
        let mut conditions = String::new();

        for filter in &query.filters {
            match filter {
                Filter::Equal { attribute, values } => {
                    if values.is_empty() {
                        conditions.push_str(" AND 0");
                        continue;
                    }
                    let column = attribute_expr(attribute, &mut params);
                    let placeholders = vec!["?"; values.len()].join(", ");
                    conditions.push_str(&format!(" AND {} IN ({})", column, placeholders));
                    params.extend(values.iter().map(to_sql_value));
                }
            }
        }

        let total: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM documents WHERE collection = ?{}",
                conditions
            ),
            params_from_iter(params.iter()),
            |row| row.get(0),
        )?;

        let mut sql = format!(
            "SELECT id, data, created_at, updated_at FROM documents WHERE collection = ?{}",
            conditions
        );
        match &query.order {
            Some(Order::Asc(attribute)) => {
                let column = attribute_expr(attribute, &mut params);
                sql.push_str(&format!(" ORDER BY {} ASC, seq ASC", column));
            }
            Some(Order::Desc(attribute)) => {
                let column = attribute_expr(attribute, &mut params);
                sql.push_str(&format!(" ORDER BY {} DESC, seq DESC", column));
            }
            None => sql.push_str(" ORDER BY seq ASC"),
        }
        if query.limit.is_some() || query.offset.is_some() {
            // SQLite only accepts OFFSET after LIMIT; -1 means no limit
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(SqlValue::Integer(query.limit.map_or(-1, i64::from)));
            params.push(SqlValue::Integer(query.offset.map_or(0, i64::from)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            Ok(DocumentRow {
                id: row.get(0)?,
                data: row.get(1)?,
                created_at: row.get(2)?,
                updated_at: row.get(3)?,
            })
        })?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(row?.try_into()?);
        }

        Ok(DocumentList {
            documents,
            total: total as u64,
        })
    }
}

impl DocumentStore for Database {
    fn create_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> BackendResult<Document> {
        Ok(self.insert_document(collection, id, &fields)?)
    }

    fn get_document(&self, collection: &str, id: &str) -> BackendResult<Document> {
        self.find_document(collection, id)?
            .ok_or_else(|| DbError::NotFound(format!("document {} in {}", id, collection)).into())
    }

    fn update_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> BackendResult<Document> {
        self.patch_document(collection, id, &fields)?
            .ok_or_else(|| DbError::NotFound(format!("document {} in {}", id, collection)).into())
    }

    fn list_documents(&self, collection: &str, query: &ListQuery) -> BackendResult<DocumentList> {
        Ok(self.query_documents(collection, query)?)
    }
}

/// Intermediate row struct for database mapping.
struct DocumentRow {
    id: String,
    data: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<DocumentRow> for Document {
    type Error = DbError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let fields: Fields = serde_json::from_str(&row.data)?;

        Ok(Document {
            id: row.id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            fields,
        })
    }
}

/// Drop system attributes (`$id`, `$createdAt`, ...); the store owns them.
fn user_attributes(fields: &Fields) -> Fields {
    fields
        .iter()
        .filter(|(key, _)| !key.starts_with('$'))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// SQL expression for an attribute; JSON paths are bound, never spliced.
fn attribute_expr(attribute: &str, params: &mut Vec<SqlValue>) -> &'static str {
    match attribute {
        "$id" => "id",
        CREATED_AT => "created_at",
        UPDATED_AT => "updated_at",
        _ => {
            params.push(SqlValue::Text(format!("$.\"{}\"", attribute.replace('"', ""))));
            "json_extract(data, ?)"
        }
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
