//! Hosted backend adapter.
//!
//! [`AppwriteClient`] implements every collaborator contract of
//! `carepulse-core` against the hosted REST API:
//!
//! - [`DocumentStore`]: `/databases/{db}/collections/{c}/documents`
//! - [`BlobStore`]: `/storage/buckets/{b}/files`
//! - [`MessagingSender`]: `/messaging/messages/sms`
//! - [`UserDirectory`]: `/users`
//!
//! Calls are blocking; the core is synchronous.

pub mod wire;

use std::time::Duration;

use carepulse_core::backend::{
    unique_id, BackendError, BackendResult, BlobStore, Document, DocumentList, DocumentStore,
    Fields, ListQuery, MessagingSender, StoredFile, UserDirectory,
};
use carepulse_core::models::{NewUser, User};
use carepulse_core::BackendConfig;
use reqwest::blocking::{multipart, Client, RequestBuilder};
use thiserror::Error;
use tracing::{debug, warn};

use wire::{CreateDocumentBody, CreateUserBody, SmsBody, UpdateDocumentBody};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors building the client.
#[derive(Error, Debug)]
pub enum AppwriteError {
    #[error("API key is required for the hosted backend")]
    MissingApiKey,

    #[error("Failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// REST client for one project and database.
pub struct AppwriteClient {
    client: Client,
    endpoint: String,
    project_id: String,
    api_key: String,
    database_id: String,
}

impl AppwriteClient {
    pub fn new(config: &BackendConfig) -> Result<Self, AppwriteError> {
        Self::with_timeout(config, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(config: &BackendConfig, timeout: Duration) -> Result<Self, AppwriteError> {
        if config.api_key.trim().is_empty() {
            return Err(AppwriteError::MissingApiKey);
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            api_key: config.api_key.clone(),
            database_id: config.database_id.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn documents_path(&self, collection: &str) -> String {
        format!(
            "/databases/{}/collections/{}/documents",
            self.database_id, collection
        )
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("X-Appwrite-Project", &self.project_id)
            .header("X-Appwrite-Key", &self.api_key)
    }

    /// Send a request and return the body of a successful response.
    fn execute(&self, request: RequestBuilder, what: &str) -> BackendResult<String> {
        let response = self.authed(request).send().map_err(|e| {
            warn!(operation = what, error = %e, "Backend request failed");
            if e.is_timeout() {
                BackendError::Transport(format!("{} timed out", what))
            } else {
                BackendError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !status.is_success() {
            debug!(operation = what, status = status.as_u16(), "Backend returned error status");
            return Err(wire::status_error(status.as_u16(), &body));
        }
        Ok(body)
    }
}

impl DocumentStore for AppwriteClient {
    fn create_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> BackendResult<Document> {
        let request = self
            .client
            .post(self.url(&self.documents_path(collection)))
            .json(&CreateDocumentBody {
                document_id: id,
                data: &fields,
            });
        wire::parse_document(&self.execute(request, "create document")?)
    }

    fn get_document(&self, collection: &str, id: &str) -> BackendResult<Document> {
        let path = format!("{}/{}", self.documents_path(collection), id);
        let request = self.client.get(self.url(&path));
        wire::parse_document(&self.execute(request, "get document")?)
    }

    fn update_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> BackendResult<Document> {
        let path = format!("{}/{}", self.documents_path(collection), id);
        let request = self
            .client
            .patch(self.url(&path))
            .json(&UpdateDocumentBody { data: &fields });
        wire::parse_document(&self.execute(request, "update document")?)
    }

    fn list_documents(&self, collection: &str, query: &ListQuery) -> BackendResult<DocumentList> {
        let url = self.url(&self.documents_path(collection));
        let list = wire::collect_pages(query, wire::PAGE_SIZE, |page| {
            let queries = wire::encode_queries(page);
            let request = self.client.get(&url).query(&wire::query_pairs(&queries));
            wire::parse_document_list(&self.execute(request, "list documents")?)
        })?;

        debug!(collection, total = list.total, read = list.documents.len(), "Listed documents");
        Ok(list)
    }
}

impl BlobStore for AppwriteClient {
    fn put_file(
        &self,
        bucket: &str,
        id: &str,
        bytes: &[u8],
        file_name: &str,
    ) -> BackendResult<StoredFile> {
        let part = multipart::Part::bytes(bytes.to_vec()).file_name(file_name.to_string());
        let form = multipart::Form::new()
            .text("fileId", id.to_string())
            .part("file", part);

        let request = self
            .client
            .post(self.url(&format!("/storage/buckets/{}/files", bucket)))
            .multipart(form);
        let body = self.execute(request, "upload file")?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl MessagingSender for AppwriteClient {
    fn send_text(&self, recipient_user_ids: &[String], body: &str) -> BackendResult<String> {
        let message_id = unique_id();
        let request = self
            .client
            .post(self.url("/messaging/messages/sms"))
            .json(&SmsBody {
                message_id: &message_id,
                content: body,
                users: recipient_user_ids,
            });
        wire::parse_message_id(&self.execute(request, "send sms")?)
    }
}

impl UserDirectory for AppwriteClient {
    fn create_user(&self, id: &str, user: &NewUser) -> BackendResult<User> {
        let request = self
            .client
            .post(self.url("/users"))
            .json(&CreateUserBody::new(id, user));
        wire::parse_user(&self.execute(request, "create user")?)
    }

    fn get_user(&self, id: &str) -> BackendResult<User> {
        let request = self.client.get(self.url(&format!("/users/{}", id)));
        wire::parse_user(&self.execute(request, "get user")?)
    }

    fn find_users_by_email(&self, email: &str) -> BackendResult<Vec<User>> {
        let query = wire::email_query(email);
        let request = self
            .client
            .get(self.url("/users"))
            .query(&[("queries[]", query.as_str())]);
        wire::parse_user_list(&self.execute(request, "list users")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BackendConfig {
        BackendConfig {
            endpoint: "https://cloud.example.com/v1/".into(),
            project_id: "carepulse".into(),
            api_key: "secret-key".into(),
            database_id: "db".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_requires_api_key() {
        let config = BackendConfig {
            api_key: "  ".into(),
            ..config()
        };
        assert!(matches!(
            AppwriteClient::new(&config),
            Err(AppwriteError::MissingApiKey)
        ));
    }

    #[test]
    fn test_paths() {
        let client = AppwriteClient::new(&config()).unwrap();

        assert_eq!(
            client.url(&client.documents_path("appointments")),
            "https://cloud.example.com/v1/databases/db/collections/appointments/documents"
        );
    }

    #[test]
    fn test_request_headers_and_query() {
        let client = AppwriteClient::new(&config()).unwrap();
        let queries = wire::encode_queries(&ListQuery::new().limit(1));

        let request = client
            .authed(
                client
                    .client
                    .get(client.url(&client.documents_path("patients")))
                    .query(&wire::query_pairs(&queries)),
            )
            .build()
            .unwrap();

        assert_eq!(request.headers()["X-Appwrite-Project"], "carepulse");
        assert_eq!(request.headers()["X-Appwrite-Key"], "secret-key");
        let query = request.url().query().unwrap();
        assert!(query.starts_with("queries%5B%5D="));
        assert!(query.contains("limit"));
    }
}
