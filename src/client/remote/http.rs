/**
 * HTTP Document Store Client
 *
 * JSON-over-HTTP client for the hosted document service.
 *
 * Routes:
 * - `GET    /v1/{collection}/{id}`           read a document (404 = absent)
 * - `PUT    /v1/{collection}/{id}?merge=..`  write a document
 * - `PATCH  /v1/{collection}/{id}`           apply field updates
 * - `DELETE /v1/{collection}/{id}`           delete a document
 * - `POST   /v1/{collection}`                create a document, returns `{"id": ..}`
 * - `POST   /v1/query`                       run a collection query
 *
 * Connection failures, timeouts and 429/502/503/504 map to `Unavailable` so
 * the sync layer treats them as connectivity loss.
 */
use super::{DocumentStore, RemoteResult};
use crate::shared::document::{Document, DocumentSnapshot, FieldUpdates, Query};
use crate::shared::error::RemoteError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Default per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: String,
}

/// Document store client speaking JSON over HTTP
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpDocumentStore {
    /// Client for the service at `base_url`
    pub fn new(base_url: impl Into<String>) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::unknown(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Send `token` as a bearer token on every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/v1/{}/{}", self.base_url, collection, id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> RemoteResult<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(%status, path, "document service rejected request");
        Err(map_status(status, path, body))
    }
}

/// Classify a transport-level failure
fn map_transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_connect() || error.is_timeout() || error.is_request() {
        RemoteError::unavailable(error.to_string())
    } else {
        RemoteError::unknown(error.to_string())
    }
}

/// Classify an unsuccessful HTTP status
fn map_status(status: StatusCode, path: &str, body: String) -> RemoteError {
    let message = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body)
    };
    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound {
            path: path.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::permission_denied(message),
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => RemoteError::unavailable(message),
        _ => RemoteError::unknown(message),
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> RemoteResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| RemoteError::unknown(format!("invalid response body: {}", e)))
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn get_document(&self, collection: &str, id: &str) -> RemoteResult<Option<DocumentSnapshot>> {
        let path = format!("{}/{}", collection, id);
        let request = self.client.get(self.document_url(collection, id));
        match self.send(request, &path).await {
            Ok(response) => {
                let data: Document = decode(response).await?;
                Ok(Some(DocumentSnapshot::new(id, data)))
            }
            Err(RemoteError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_document(&self, collection: &str, id: &str, data: Document, merge: bool) -> RemoteResult<()> {
        let request = self
            .client
            .put(self.document_url(collection, id))
            .query(&[("merge", merge)])
            .json(&data);
        self.send(request, &format!("{}/{}", collection, id)).await?;
        Ok(())
    }

    async fn update_document(&self, collection: &str, id: &str, updates: FieldUpdates) -> RemoteResult<()> {
        let request = self
            .client
            .patch(self.document_url(collection, id))
            .json(&updates);
        self.send(request, &format!("{}/{}", collection, id)).await?;
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> RemoteResult<()> {
        let request = self.client.delete(self.document_url(collection, id));
        match self.send(request, &format!("{}/{}", collection, id)).await {
            Ok(_) | Err(RemoteError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn add_document(&self, collection: &str, data: Document) -> RemoteResult<String> {
        let request = self
            .client
            .post(format!("{}/v1/{}", self.base_url, collection))
            .json(&data);
        let response = self.send(request, collection).await?;
        let created: CreatedResponse = decode(response).await?;
        Ok(created.id)
    }

    async fn query_collection(&self, query: &Query) -> RemoteResult<Vec<DocumentSnapshot>> {
        let request = self
            .client
            .post(format!("{}/v1/query", self.base_url))
            .json(query);
        let response = self.send(request, &query.collection).await?;
        decode(response).await
    }
}
