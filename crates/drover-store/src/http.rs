//! HTTP client for a JSON document store API.
//!
//! The wire protocol is a thin JSON mapping of the [`DocumentStore`]
//! contract: one endpoint per operation under
//! `/collections/{collection}/...`, with cursor-token pagination for
//! queries. Transient server failures are retried a bounded number of times
//! with exponential pacing before surfacing to the caller.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    Document, DocumentStore, DocumentStream, Filter, IndexSpec, StoreError, Update, UpdateOutcome,
};

/// Documents fetched per query page.
const PAGE_SIZE: u32 = 100;

/// Total request attempts: initial + 3 retries.
const MAX_ATTEMPTS: u32 = 4;

#[derive(Serialize)]
struct QueryRequest<'a> {
    filter: &'a Filter,
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    documents: Vec<Document>,
    cursor: Option<String>,
}

#[derive(Serialize)]
struct FilterRequest<'a> {
    filter: &'a Filter,
}

#[derive(Deserialize)]
struct FindOneResponse {
    document: Option<Document>,
}

#[derive(Serialize)]
struct UpdateOneRequest<'a> {
    filter: &'a Filter,
    update: &'a Update,
}

#[derive(Serialize)]
struct InsertManyRequest<'a> {
    documents: &'a [Document],
}

#[derive(Deserialize)]
struct DeleteManyResponse {
    deleted: u64,
}

#[derive(Deserialize)]
struct ListIndexesResponse {
    indexes: Vec<IndexSpec>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: String,
    message: String,
}

#[derive(Serialize)]
struct Empty {}

/// Client for a document store exposed over HTTP.
#[derive(Clone)]
pub struct HttpStore {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpStore {
    /// Create a client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            base_url: base_url.into(),
            token: None,
        }
    }

    /// Attach a bearer token to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Check if an error is transient and worth retrying.
    fn is_transient_error(err: &StoreError) -> bool {
        match err {
            StoreError::Unavailable(_) => true,
            StoreError::Api { error, .. } => error == "transient",
            _ => false,
        }
    }

    fn is_transient_status(status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        )
    }

    async fn request<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, StoreError> {
        let url = format!("{}{}", self.base_url, path);

        let mut last_error = None;
        for attempt in 0..MAX_ATTEMPTS {
            let mut request = self.http.request(method.clone(), &url).json(body);
            if let Some(ref token) = self.token {
                request = request.header("Authorization", format!("Bearer {}", token));
            }

            let result = match request.send().await {
                Ok(response) => Self::handle_response(response).await,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    Err(StoreError::Unavailable(e.to_string()))
                }
                Err(e) => Err(StoreError::Http(e)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(ref e) if attempt < MAX_ATTEMPTS - 1 && Self::is_transient_error(e) => {
                    let backoff_ms = 500 * (1u64 << attempt); // 500ms, 1s, 2s
                    debug!(
                        attempt = attempt + 1,
                        backoff_ms,
                        error = %e,
                        "transient store error, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    last_error = Some(result);
                    continue;
                }
                Err(_) => return result,
            }
        }

        last_error.unwrap_or_else(|| {
            Err(StoreError::Unavailable("retry budget exhausted".to_string()))
        })
    }

    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        if Self::is_transient_status(status) {
            return Err(StoreError::Api {
                error: "transient".to_string(),
                message: format!("store returned {}", status),
            });
        }

        match response.json::<ApiErrorBody>().await {
            Ok(body) if body.error == "duplicate_key" => Err(StoreError::DuplicateKey {
                index: body.message,
            }),
            Ok(body) => Err(StoreError::Api {
                error: body.error,
                message: body.message,
            }),
            Err(_) => Err(StoreError::Api {
                error: status.to_string(),
                message: "unparseable error response".to_string(),
            }),
        }
    }

    async fn query_page(
        &self,
        collection: &str,
        filter: &Filter,
        cursor: Option<&str>,
    ) -> Result<QueryResponse, StoreError> {
        self.request(
            Method::POST,
            &format!("/collections/{}/query", collection),
            &QueryRequest {
                filter,
                limit: PAGE_SIZE,
                cursor,
            },
        )
        .await
    }
}

struct PageState {
    client: HttpStore,
    collection: String,
    filter: Filter,
    cursor: Option<String>,
    buffered: VecDeque<Document>,
    done: bool,
}

#[async_trait]
impl DocumentStore for HttpStore {
    async fn find(&self, collection: &str, filter: Filter) -> Result<DocumentStream, StoreError> {
        // Fetch the first page eagerly so connection problems surface here
        // rather than on first poll; subsequent pages are fetched lazily as
        // the stream drains, keeping read-ahead bounded to one page.
        let first = self.query_page(collection, &filter, None).await?;
        let state = PageState {
            client: self.clone(),
            collection: collection.to_string(),
            filter,
            done: first.cursor.is_none(),
            cursor: first.cursor,
            buffered: first.documents.into(),
        };

        let stream = stream::try_unfold(state, |mut state| async move {
            loop {
                if let Some(doc) = state.buffered.pop_front() {
                    return Ok(Some((doc, state)));
                }
                if state.done {
                    return Ok(None);
                }
                let page = state
                    .client
                    .query_page(&state.collection, &state.filter, state.cursor.as_deref())
                    .await?;
                state.buffered = page.documents.into();
                state.done = page.cursor.is_none();
                state.cursor = page.cursor;
            }
        });
        Ok(stream.boxed())
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Filter,
    ) -> Result<Option<Document>, StoreError> {
        let response: FindOneResponse = self
            .request(
                Method::POST,
                &format!("/collections/{}/find-one", collection),
                &FilterRequest { filter: &filter },
            )
            .await?;
        Ok(response.document)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Filter,
        update: Update,
    ) -> Result<UpdateOutcome, StoreError> {
        self.request(
            Method::POST,
            &format!("/collections/{}/update-one", collection),
            &UpdateOneRequest {
                filter: &filter,
                update: &update,
            },
        )
        .await
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<(), StoreError> {
        let _: serde_json::Value = self
            .request(
                Method::POST,
                &format!("/collections/{}/insert-many", collection),
                &InsertManyRequest { documents: &docs },
            )
            .await?;
        Ok(())
    }

    async fn delete_many(&self, collection: &str, filter: Filter) -> Result<u64, StoreError> {
        let response: DeleteManyResponse = self
            .request(
                Method::POST,
                &format!("/collections/{}/delete-many", collection),
                &FilterRequest { filter: &filter },
            )
            .await?;
        Ok(response.deleted)
    }

    async fn create_index(&self, collection: &str, spec: IndexSpec) -> Result<(), StoreError> {
        let _: serde_json::Value = self
            .request(
                Method::PUT,
                &format!("/collections/{}/indexes/{}", collection, spec.name),
                &spec,
            )
            .await?;
        Ok(())
    }

    async fn drop_index(&self, collection: &str, name: &str) -> Result<(), StoreError> {
        let _: serde_json::Value = self
            .request(
                Method::DELETE,
                &format!("/collections/{}/indexes/{}", collection, name),
                &Empty {},
            )
            .await?;
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>, StoreError> {
        let response: ListIndexesResponse = self
            .request(
                Method::GET,
                &format!("/collections/{}/indexes", collection),
                &Empty {},
            )
            .await?;
        Ok(response.indexes)
    }
}
