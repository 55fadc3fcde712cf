//! HTTP client for the entries service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::RemoteAuthority;
use crate::config::RemoteConfig;
use crate::error::RemoteError;
use crate::models::{Entry, EntryData, EntryId};

/// Timeout for the reachability probe; much shorter than a normal request
const PROBE_TIMEOUT_SECS: u64 = 3;

/// REST client for `{base}/entries`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpRemote {
  client: Client,
  base: Url,
  token: Option<String>,
}

impl HttpRemote {
  pub fn new(config: &RemoteConfig, token: Option<String>) -> Result<Self, RemoteError> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;

    // A trailing slash makes Url::join append instead of replacing the last segment
    let mut raw = config.url.trim_end_matches('/').to_string();
    raw.push('/');
    let base = Url::parse(&raw).map_err(|e| {
      RemoteError::InvalidResponse(format!("Invalid remote url '{}': {}", config.url, e))
    })?;

    Ok(Self {
      client,
      base,
      token,
    })
  }

  fn url(&self, path: &str) -> Result<Url, RemoteError> {
    self
      .base
      .join(path)
      .map_err(|e| RemoteError::InvalidResponse(format!("Invalid endpoint '{}': {}", path, e)))
  }

  fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
    let builder = self
      .client
      .request(method, url)
      .header(header::ACCEPT, "application/json");
    match &self.token {
      Some(token) => builder.bearer_auth(token),
      None => builder,
    }
  }

  /// Turn non-success statuses into typed errors.
  async fn check_response(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::from_status(status, &body))
  }

  async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    let body = response.text().await?;
    serde_json::from_str(&body)
      .map_err(|e| RemoteError::InvalidResponse(format!("Failed to parse response: {}", e)))
  }

  /// Whether the service answers at all, regardless of status code.
  pub async fn is_reachable(&self) -> bool {
    let result = self
      .client
      .get(self.base.clone())
      .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
      .send()
      .await;

    match result {
      Ok(_) => true,
      Err(e) => {
        debug!(error = %e, "Remote probe failed");
        false
      }
    }
  }
}

#[async_trait]
impl RemoteAuthority for HttpRemote {
  async fn add_entry(&self, data: &EntryData) -> Result<Entry, RemoteError> {
    let url = self.url("entries")?;
    debug!(%url, item = %data.item, "POST entry");

    let response = self
      .request(reqwest::Method::POST, url)
      .json(data)
      .send()
      .await?;
    let response = Self::check_response(response).await?;
    Self::parse_json(response).await
  }

  async fn update_entry(&self, id: EntryId, data: &EntryData) -> Result<(), RemoteError> {
    let url = self.url(&format!("entries/{}", id))?;
    debug!(%url, "PUT entry");

    let response = self
      .request(reqwest::Method::PUT, url)
      .json(data)
      .send()
      .await?;
    Self::check_response(response).await?;
    Ok(())
  }

  async fn delete_entry(&self, id: EntryId) -> Result<(), RemoteError> {
    let url = self.url(&format!("entries/{}", id))?;
    debug!(%url, "DELETE entry");

    let response = self.request(reqwest::Method::DELETE, url).send().await?;
    Self::check_response(response).await?;
    Ok(())
  }

  async fn list_entries(&self) -> Result<Vec<Entry>, RemoteError> {
    let url = self.url("entries")?;
    debug!(%url, "GET entries");

    let response = self.request(reqwest::Method::GET, url).send().await?;
    let response = Self::check_response(response).await?;
    Self::parse_json(response).await
  }
}
