//! PostgREST-compatible HTTP bookmark store.
//!
//! Talks to a hosted `bookmarks` table over the REST dialect used by
//! PostgREST: column filters as `col=eq.value` query parameters and
//! `Prefer: return=representation` to get inserted rows back.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::debug;

use crate::services::bookmark_store::BookmarkStore;
use crate::types::bookmark::{Bookmark, NewBookmark};
use crate::types::errors::StoreError;

const TABLE_PATH: &str = "rest/v1/bookmarks";

/// Bookmark store backed by a PostgREST endpoint.
pub struct RestBookmarkStore {
    client: Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

impl RestBookmarkStore {
    /// Every request, body included, is abandoned after `request_timeout`.
    pub fn new(base_url: &str, api_key: &str, request_timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| StoreError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            access_token: None,
        })
    }

    /// Uses a user access token instead of the API key as the bearer credential.
    pub fn with_access_token(mut self, token: &str) -> Self {
        self.access_token = Some(token.to_string());
        self
    }

    /// Endpoint URL of the bookmarks table.
    pub fn table_url(&self) -> String {
        format!("{}/{}", self.base_url, TABLE_PATH)
    }

    /// Query parameters selecting one owner's rows, newest first.
    pub fn query_params(owner_id: &str) -> Vec<(&'static str, String)> {
        vec![
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", owner_id)),
            ("order", "created_at.desc".to_string()),
        ]
    }

    /// Query parameters selecting a single owned row.
    pub fn delete_params(id: &str, owner_id: &str) -> Vec<(&'static str, String)> {
        vec![
            ("id", format!("eq.{}", id)),
            ("user_id", format!("eq.{}", owner_id)),
        ]
    }

    fn headers(&self) -> Result<HeaderMap, StoreError> {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.api_key).map_err(|e| StoreError::Http(e.to_string()))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", bearer))
                .map_err(|e| StoreError::Http(e.to_string()))?,
        );
        Ok(headers)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, StoreError> {
        let response = request
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StoreError::Timeout
                } else {
                    StoreError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Http(describe_status(status, &body)))
    }
}

fn describe_status(status: StatusCode, body: &str) -> String {
    if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body)
    }
}

#[async_trait]
impl BookmarkStore for RestBookmarkStore {
    async fn query(&self, owner_id: &str) -> Result<Vec<Bookmark>, StoreError> {
        let request = self
            .client
            .get(self.table_url())
            .query(&Self::query_params(owner_id));
        let response = self.send(request).await?;
        response
            .json::<Vec<Bookmark>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn insert(&self, record: NewBookmark) -> Result<Bookmark, StoreError> {
        let request = self
            .client
            .post(self.table_url())
            .header("Prefer", "return=representation")
            .json(&[&record]);
        let response = self.send(request).await?;
        let mut rows = response
            .json::<Vec<Bookmark>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        let row = rows
            .pop()
            .ok_or_else(|| StoreError::Decode("insert returned no rows".to_string()))?;
        debug!(bookmark_id = %row.id, "Bookmark inserted remotely");
        Ok(row)
    }

    async fn delete(&self, id: &str, owner_id: &str) -> Result<(), StoreError> {
        let request = self
            .client
            .delete(self.table_url())
            .query(&Self::delete_params(id, owner_id));
        self.send(request).await?;
        Ok(())
    }
}
