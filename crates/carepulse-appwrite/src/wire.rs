//! Request bodies, query encoding and response parsing.
//!
//! Nothing here touches the network.

use carepulse_core::backend::{
    BackendError, BackendResult, Document, DocumentList, Fields, Filter, ListQuery, Order,
};
use carepulse_core::models::{NewUser, User};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Body of `POST .../documents`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentBody<'a> {
    pub document_id: &'a str,
    pub data: &'a Fields,
}

/// Body of `PATCH .../documents/{id}`.
#[derive(Debug, Serialize)]
pub struct UpdateDocumentBody<'a> {
    pub data: &'a Fields,
}

/// Body of `POST /messaging/messages/sms`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsBody<'a> {
    pub message_id: &'a str,
    pub content: &'a str,
    pub users: &'a [String],
}

/// Body of `POST /users`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserBody<'a> {
    pub user_id: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
    pub name: &'a str,
}

impl<'a> CreateUserBody<'a> {
    pub fn new(id: &'a str, user: &'a NewUser) -> Self {
        Self {
            user_id: id,
            email: &user.email,
            phone: &user.phone,
            name: &user.name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageCreated {
    #[serde(rename = "$id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct UserList {
    users: Vec<User>,
}

/// Error body returned by the API.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: String,
}

/// Encode a list query as `queries[]` values.
pub fn encode_queries(query: &ListQuery) -> Vec<String> {
    let mut queries = Vec::new();

    for filter in &query.filters {
        match filter {
            Filter::Equal { attribute, values } => queries.push(
                json!({ "method": "equal", "attribute": attribute, "values": values }).to_string(),
            ),
        }
    }

    match &query.order {
        Some(Order::Desc(attribute)) => {
            queries.push(json!({ "method": "orderDesc", "attribute": attribute }).to_string())
        }
        Some(Order::Asc(attribute)) => {
            queries.push(json!({ "method": "orderAsc", "attribute": attribute }).to_string())
        }
        None => {}
    }

    if let Some(limit) = query.limit {
        queries.push(json!({ "method": "limit", "values": [limit] }).to_string());
    }
    if let Some(offset) = query.offset {
        queries.push(json!({ "method": "offset", "values": [offset] }).to_string());
    }

    queries
}

/// Documents requested per page when a list call has no limit.
///
/// The API caps unlimited list calls at its own default page size, so an
/// unlimited query is read page by page.
pub const PAGE_SIZE: u32 = 100;

/// Run `query` through `fetch`, following pages until every match is read.
///
/// A query with an explicit limit is a single call.
pub fn collect_pages<F>(
    query: &ListQuery,
    page_size: u32,
    mut fetch: F,
) -> BackendResult<DocumentList>
where
    F: FnMut(&ListQuery) -> BackendResult<DocumentList>,
{
    if query.limit.is_some() {
        return fetch(query);
    }

    let mut offset = query.offset.unwrap_or(0);
    let mut documents = Vec::new();
    loop {
        let page = fetch(&query.clone().limit(page_size).offset(offset))?;
        let received = page.documents.len() as u32;
        documents.extend(page.documents);

        if received < page_size || u64::from(offset) + u64::from(received) >= page.total {
            return Ok(DocumentList {
                documents,
                total: page.total,
            });
        }
        offset += received;
    }
}

/// Queries as `(name, value)` pairs for the URL.
pub fn query_pairs(queries: &[String]) -> Vec<(&'static str, &str)> {
    queries.iter().map(|q| ("queries[]", q.as_str())).collect()
}

/// Map a non-success response onto a [`BackendError`].
pub fn status_error(status: u16, body: &str) -> BackendError {
    let detail = match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) if !parsed.message.is_empty() => {
            if parsed.kind.is_empty() {
                parsed.message
            } else {
                format!("{} ({})", parsed.message, parsed.kind)
            }
        }
        _ => format!("HTTP {}", status),
    };

    match status {
        404 => BackendError::NotFound(detail),
        409 => BackendError::Conflict(detail),
        _ => BackendError::Transport(detail),
    }
}

pub fn parse_document(body: &str) -> BackendResult<Document> {
    Ok(serde_json::from_str(body)?)
}

pub fn parse_document_list(body: &str) -> BackendResult<DocumentList> {
    #[derive(Deserialize)]
    struct Raw {
        total: u64,
        documents: Vec<Document>,
    }

    let raw: Raw = serde_json::from_str(body)?;
    Ok(DocumentList {
        documents: raw.documents,
        total: raw.total,
    })
}

pub fn parse_user(body: &str) -> BackendResult<User> {
    Ok(serde_json::from_str(body)?)
}

pub fn parse_user_list(body: &str) -> BackendResult<Vec<User>> {
    Ok(serde_json::from_str::<UserList>(body)?.users)
}

pub fn parse_message_id(body: &str) -> BackendResult<String> {
    Ok(serde_json::from_str::<MessageCreated>(body)?.id)
}

/// Equality query on the account email.
pub fn email_query(email: &str) -> String {
    json!({ "method": "equal", "attribute": "email", "values": [Value::from(email)] }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_queries_in_order() {
        let query = ListQuery::new()
            .equal("userId", "user-1")
            .order_desc("$createdAt")
            .limit(1);

        let encoded: Vec<Value> = encode_queries(&query)
            .iter()
            .map(|q| serde_json::from_str(q).unwrap())
            .collect();

        assert_eq!(
            encoded,
            vec![
                json!({ "method": "equal", "attribute": "userId", "values": ["user-1"] }),
                json!({ "method": "orderDesc", "attribute": "$createdAt" }),
                json!({ "method": "limit", "values": [1] }),
            ]
        );
    }

    #[test]
    fn test_encode_page_query() {
        let query = ListQuery::new().order_desc("$createdAt").limit(100).offset(200);

        let encoded: Vec<Value> = encode_queries(&query)
            .iter()
            .map(|q| serde_json::from_str(q).unwrap())
            .collect();

        assert_eq!(
            encoded[1..],
            [
                json!({ "method": "limit", "values": [100] }),
                json!({ "method": "offset", "values": [200] }),
            ]
        );
    }

    fn stored(total: usize) -> Vec<Document> {
        (0..total)
            .map(|i| Document {
                id: format!("a{}", i),
                created_at: "2026-10-01T00:00:00.000+00:00".into(),
                updated_at: "2026-10-01T00:00:00.000+00:00".into(),
                fields: Fields::new(),
            })
            .collect()
    }

    /// Serves `stored` the way the API does: one page per call.
    fn serve(stored: &[Document], query: &ListQuery) -> DocumentList {
        let start = query.offset.unwrap_or(0) as usize;
        let end = (start + query.limit.unwrap_or(25) as usize).min(stored.len());
        DocumentList {
            documents: stored.get(start..end).unwrap_or_default().to_vec(),
            total: stored.len() as u64,
        }
    }

    #[test]
    fn test_collect_pages_reads_every_match() {
        let all = stored(40);
        let mut calls = Vec::new();

        let list = collect_pages(&ListQuery::new().order_desc("$createdAt"), 15, |q| {
            calls.push((q.limit, q.offset));
            Ok(serve(&all, q))
        })
        .unwrap();

        assert_eq!(list.total, 40);
        assert_eq!(list.documents.len(), 40);
        assert_eq!(list.documents[39].id, "a39");
        assert_eq!(
            calls,
            vec![(Some(15), Some(0)), (Some(15), Some(15)), (Some(15), Some(30))]
        );
    }

    #[test]
    fn test_collect_pages_exact_multiple_and_empty() {
        let all = stored(30);
        let mut calls = 0;
        let list = collect_pages(&ListQuery::new(), 15, |q| {
            calls += 1;
            Ok(serve(&all, q))
        })
        .unwrap();
        assert_eq!(list.documents.len(), 30);
        assert_eq!(calls, 2);

        let list = collect_pages(&ListQuery::new(), 15, |q| Ok(serve(&[], q))).unwrap();
        assert_eq!(list.total, 0);
        assert!(list.documents.is_empty());
    }

    #[test]
    fn test_collect_pages_keeps_explicit_limit() {
        let all = stored(40);
        let mut calls = 0;

        let list = collect_pages(&ListQuery::new().limit(1), 15, |q| {
            calls += 1;
            Ok(serve(&all, q))
        })
        .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(list.documents.len(), 1);
        assert_eq!(list.total, 40);
    }

    #[test]
    fn test_collect_pages_stops_on_error() {
        let err = collect_pages(&ListQuery::new(), 15, |_| {
            Err(BackendError::Transport("connection reset".into()))
        })
        .unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
    }

    #[test]
    fn test_encode_empty_query() {
        assert!(encode_queries(&ListQuery::new()).is_empty());
    }

    #[test]
    fn test_status_error_mapping() {
        let body = concat!(
            r#"{"message":"Document with the requested ID could not be found.","#,
            r#""code":404,"type":"document_not_found"}"#
        );
        match status_error(404, body) {
            BackendError::NotFound(detail) => assert!(detail.contains("document_not_found")),
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(status_error(409, ""), BackendError::Conflict(_)));
        assert_eq!(
            status_error(503, "<html>"),
            BackendError::Transport("HTTP 503".into())
        );
    }

    #[test]
    fn test_parse_document_list() {
        let body = json!({
            "total": 2,
            "documents": [
                {
                    "$id": "a1",
                    "$createdAt": "2026-10-02T00:00:00.000+00:00",
                    "$updatedAt": "2026-10-02T00:00:00.000+00:00",
                    "status": "pending"
                },
                {
                    "$id": "a2",
                    "$createdAt": "2026-10-01T00:00:00.000+00:00",
                    "$updatedAt": "2026-10-01T00:00:00.000+00:00",
                    "status": "scheduled"
                }
            ]
        })
        .to_string();

        let list = parse_document_list(&body).unwrap();
        assert_eq!(list.total, 2);
        assert_eq!(list.documents[1].id, "a2");
        assert_eq!(list.documents[0].fields["status"], "pending");
    }

    #[test]
    fn test_parse_failures_are_malformed() {
        assert!(matches!(parse_document("{"), Err(BackendError::Malformed(_))));
        assert!(matches!(parse_message_id("{}"), Err(BackendError::Malformed(_))));
    }

    #[test]
    fn test_parse_user_list() {
        let body = json!({
            "total": 1,
            "users": [{
                "$id": "user-1",
                "$createdAt": "2026-10-01T00:00:00.000+00:00",
                "name": "Ada",
                "email": "ada@example.com",
                "phone": "+15555550100",
                "status": true
            }]
        })
        .to_string();

        let users = parse_user_list(&body).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email, "ada@example.com");
    }

    #[test]
    fn test_request_bodies() {
        let mut data = Fields::new();
        data.insert("status".into(), json!("pending"));

        let create = serde_json::to_value(CreateDocumentBody {
            document_id: "a1",
            data: &data,
        })
        .unwrap();
        assert_eq!(create, json!({ "documentId": "a1", "data": { "status": "pending" } }));

        let recipients = vec!["user-1".to_string()];
        let sms = serde_json::to_value(SmsBody {
            message_id: "m1",
            content: "hello",
            users: &recipients,
        })
        .unwrap();
        assert_eq!(sms, json!({ "messageId": "m1", "content": "hello", "users": ["user-1"] }));

        let user = NewUser {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            phone: "+15555550100".into(),
        };
        let body = serde_json::to_value(CreateUserBody::new("u1", &user)).unwrap();
        assert_eq!(body["userId"], "u1");
        assert_eq!(body["phone"], "+15555550100");
    }
}
