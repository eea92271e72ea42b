//! services/api/src/adapters/pocketbase.rs
//!
//! This module contains the concrete implementation of the `RecordStore` and
//! `AuthService` ports for a PocketBase backend reached over its REST API.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::ConfigError;
use crate::error::ApiError;

use training_core::{
    domain::{AuthSession, User},
    ports::{AuthService, Collection, PortError, PortResult, Record, RecordPage, RecordStore},
    query::ListQuery,
    AuthState,
};

/// The concrete adapter for a PocketBase instance.
#[derive(Clone)]
pub struct PocketBaseAdapter {
    client: Client,
    base_url: Url,
    auth: AuthState,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
    record: User,
}

#[derive(Deserialize)]
struct TokenClaims {
    exp: i64,
}

#[derive(Deserialize, Default)]
struct StoreErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Value,
}

impl PocketBaseAdapter {
    /// Creates a new adapter. Requests carry the token held by `auth`, if any.
    pub fn new(base_url: &str, auth: AuthState, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ConfigError::InvalidValue("STORE_URL".to_string(), e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidValue(
                "STORE_URL".to_string(),
                format!("'{}' cannot hold a path", base_url),
            )
            .into());
        }
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url,
            auth,
        })
    }

    /// The same store and connection pool, acting under another auth session.
    pub fn with_auth(&self, auth: AuthState) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            auth,
        }
    }

    /// `{base}/api/collections/{collection}/{tail...}`, one escaped segment each.
    fn collection_url(&self, collection: Collection, tail: &[&str]) -> PortResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PortError::Unexpected(format!("Store URL {} cannot hold a path", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "collections", collection.as_str()])
            .extend(tail);
        Ok(url)
    }

    fn records_url(&self, collection: Collection) -> PortResult<Url> {
        self.collection_url(collection, &["records"])
    }

    fn record_url(&self, collection: Collection, id: &str) -> PortResult<Url> {
        if !is_record_id(id) {
            return Err(PortError::NotFound(format!(
                "{} record {:?} not found",
                collection, id
            )));
        }
        self.collection_url(collection, &["records", id])
    }

    /// Builds a request with the current auth token attached.
    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match self.auth.token() {
            Some(token) => builder.header(reqwest::header::AUTHORIZATION, token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> PortResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| PortError::Transport(e.to_string()))?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body: StoreErrorBody = response.json().await.unwrap_or_default();
        Err(map_status(status, body))
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> PortResult<T> {
        self.send(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| PortError::Unexpected(format!("Malformed store response: {}", e)))
    }
}

fn map_status(status: StatusCode, body: StoreErrorBody) -> PortError {
    let detail = if body.data.is_null() || body.data == json!({}) {
        body.message
    } else {
        format!("{} {}", body.message, body.data)
    };
    match status {
        StatusCode::BAD_REQUEST => PortError::Validation(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized,
        StatusCode::NOT_FOUND => PortError::NotFound(detail),
        other => PortError::Transport(format!("HTTP {}: {}", other, detail)),
    }
}

/// Store ids are short runs of letters, digits and underscores. Anything else
/// cannot name a record and must never reach a URL path.
fn is_record_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Reads the expiry out of the token's JWT payload.
fn token_expiry(token: &str) -> PortResult<DateTime<Utc>> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| PortError::Unexpected("Auth token is not a JWT".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| PortError::Unexpected(format!("Auth token payload is not base64: {}", e)))?;
    let claims: TokenClaims = serde_json::from_slice(&bytes)
        .map_err(|e| PortError::Unexpected(format!("Auth token has no expiry: {}", e)))?;
    DateTime::from_timestamp(claims.exp, 0)
        .ok_or_else(|| PortError::Unexpected(format!("Auth token expiry {} is out of range", claims.exp)))
}

fn list_params(query: &ListQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("page", query.page.to_string()),
        ("perPage", query.per_page.to_string()),
    ];
    if let Some(filter) = query.render_filter() {
        params.push(("filter", filter));
    }
    if let Some(sort) = query.render_sort() {
        params.push(("sort", sort));
    }
    if let Some(expand) = query.render_expand() {
        params.push(("expand", expand));
    }
    params
}

//=========================================================================================
// `RecordStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RecordStore for PocketBaseAdapter {
    async fn create(&self, collection: Collection, fields: Value) -> PortResult<Record> {
        debug!("POST {} record", collection);
        let request = self
            .request(Method::POST, self.records_url(collection)?)
            .json(&fields);
        self.send_json(request).await
    }

    async fn update(&self, collection: Collection, id: &str, fields: Value) -> PortResult<Record> {
        debug!("PATCH {} record {}", collection, id);
        let request = self
            .request(Method::PATCH, self.record_url(collection, id)?)
            .json(&fields);
        self.send_json(request).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> PortResult<()> {
        debug!("DELETE {} record {}", collection, id);
        let request = self.request(Method::DELETE, self.record_url(collection, id)?);
        self.send(request).await.map(|_| ())
    }

    async fn get_one(
        &self,
        collection: Collection,
        id: &str,
        expand: &[&str],
    ) -> PortResult<Record> {
        let mut request = self.request(Method::GET, self.record_url(collection, id)?);
        if !expand.is_empty() {
            request = request.query(&[("expand", expand.join(","))]);
        }
        self.send_json(request).await
    }

    async fn get_list(&self, collection: Collection, query: &ListQuery) -> PortResult<RecordPage> {
        let request = self
            .request(Method::GET, self.records_url(collection)?)
            .query(&list_params(query));
        self.send_json(request).await
    }
}

//=========================================================================================
// `AuthService` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuthService for PocketBaseAdapter {
    async fn authenticate(&self, identity: &str, secret: &str) -> PortResult<AuthSession> {
        let url = self.collection_url(Collection::Users, &["auth-with-password"])?;
        let request = self
            .client
            .post(url)
            .json(&json!({ "identity": identity, "password": secret }));
        let response: AuthResponse = match self.send_json(request).await {
            // A rejected password comes back as a 400.
            Err(PortError::Validation(_)) => return Err(PortError::Unauthorized),
            other => other?,
        };
        let expires_at = token_expiry(&response.token)?;
        Ok(AuthSession {
            token: response.token,
            user: response.record,
            expires_at,
        })
    }
}
