use crate::config::Config;
use crate::lemmy::api::LemmyApi;
use crate::lemmy::api_types::{
  ApiCommentListResponse, ApiCommunityResponse, ApiPostListResponse, ApiSiteResponse,
  CommentQuery, SortType,
};
use crate::lemmy::audit::RequestLog;
use crate::lemmy::rate_limit::RateLimiter;
use crate::lemmy::types::Comment;
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;
use url::Url;

const USER_AGENT: &str = concat!("lemmy-sync/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Lemmy HTTP client with global request spacing and a request audit log
pub struct LemmyClient {
  http: reqwest::Client,
  base_url: String,
  limiter: tokio::sync::Mutex<RateLimiter>,
  log: Mutex<RequestLog>,
}

impl LemmyClient {
  pub fn new(config: &Config) -> Result<Self> {
    let http = reqwest::Client::builder()
      .user_agent(USER_AGENT)
      .timeout(REQUEST_TIMEOUT)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url: config.base_url.clone(),
      limiter: tokio::sync::Mutex::new(RateLimiter::new(config.request_interval())),
      log: Mutex::new(RequestLog::default()),
    })
  }

  fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<Url> {
    let raw = format!("{}/{}", self.base_url, path);
    Url::parse_with_params(&raw, query).map_err(|e| eyre!("Invalid URL {}: {}", raw, e))
  }

  /// Issue a GET and decode the JSON body.
  ///
  /// The limiter guard is held for the whole exchange so calls never overlap.
  async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
    let url = self.endpoint(path, query)?;

    let mut limiter = self.limiter.lock().await;
    limiter.acquire().await;

    self
      .log
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .record(url.as_str());
    debug!(url = %url, "GET");

    let response = self
      .http
      .get(url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", url, e))?;

    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(|e| eyre!("Failed to read response from {}: {}", url, e))?;
    drop(limiter);

    if !status.is_success() {
      return Err(eyre!("API returned {}: {}", status.as_u16(), body));
    }

    serde_json::from_str(&body).map_err(|e| eyre!("Failed to parse response from {}: {}", url, e))
  }
}

impl LemmyApi for LemmyClient {
  async fn site(&self) -> Result<ApiSiteResponse> {
    self.get("site", &[]).await
  }

  async fn community(&self, name: &str) -> Result<ApiCommunityResponse> {
    self.get("community", &[("name", name.to_string())]).await
  }

  async fn list_posts(
    &self,
    community: &str,
    sort: SortType,
    page: u32,
    limit: u32,
  ) -> Result<Vec<Map<String, Value>>> {
    let response: ApiPostListResponse = self
      .get(
        "post/list",
        &[
          ("community_name", community.to_string()),
          ("sort", sort.as_str().to_string()),
          ("page", page.to_string()),
          ("limit", limit.to_string()),
        ],
      )
      .await?;
    Ok(response.posts)
  }

  async fn list_comments(&self, query: &CommentQuery) -> Result<Vec<Comment>> {
    let response: ApiCommentListResponse = self
      .get(
        "comment/list",
        &[
          ("post_id", query.post_id.to_string()),
          ("community_name", query.community.clone()),
          ("max_depth", query.max_depth.to_string()),
          ("sort", query.sort.as_str().to_string()),
          ("type_", "All".to_string()),
          ("limit", query.limit.to_string()),
          ("page", query.page.to_string()),
        ],
      )
      .await?;
    Ok(response.comments)
  }

  fn flush_request_log(&self, path: &Path) -> Result<usize> {
    self
      .log
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .flush(path)
  }
}
