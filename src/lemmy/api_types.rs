//! Serde-deserializable types matching Lemmy v3 API responses.
//!
//! Listing payloads are kept as raw JSON objects so they can be archived
//! verbatim. The typed structs here only cover the fields the sync engine reads.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// Re-serialize a value through JSON to read a typed view out of a raw payload.
pub fn reserialize<T: DeserializeOwned>(value: impl Serialize) -> serde_json::Result<T> {
  serde_json::from_value(serde_json::to_value(value)?)
}

// ============================================================================
// Listing envelopes
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiPostListResponse {
  #[serde(default)]
  pub posts: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCommentListResponse {
  #[serde(default)]
  pub comments: Vec<Value>,
}

// ============================================================================
// Post view (the subset of fields the engine relies on)
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiPostView {
  pub post: ApiPost,
  pub community: ApiCommunity,
  #[serde(default)]
  pub counts: ApiPostCounts,
}

#[derive(Debug, Deserialize)]
pub struct ApiPost {
  pub id: i64,
  pub name: String,
  pub published: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiCommunity {
  pub name: String,
  pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiPostCounts {
  #[serde(default)]
  pub comments: u64,
}

/// Minimal shape of an archived line: only the post id is parsed back.
#[derive(Debug, Deserialize)]
pub struct StoredPostLine {
  pub post: StoredPostId,
}

#[derive(Debug, Deserialize)]
pub struct StoredPostId {
  pub id: i64,
}

// ============================================================================
// Site / community info
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiSiteResponse {
  pub site_view: Option<ApiSiteView>,
  pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiSiteView {
  pub site: ApiSite,
}

#[derive(Debug, Deserialize)]
pub struct ApiSite {
  pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiCommunityResponse {
  pub community_view: ApiCommunityView,
}

#[derive(Debug, Deserialize)]
pub struct ApiCommunityView {
  pub community: ApiCommunity,
  #[serde(default)]
  pub counts: ApiCommunityCounts,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiCommunityCounts {
  #[serde(default)]
  pub subscribers: u64,
  #[serde(default)]
  pub posts: u64,
}

// ============================================================================
// Query parameters
// ============================================================================

/// Sort orders requested from the listing endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortType {
  /// Newest first
  New,
}

impl SortType {
  pub fn as_str(self) -> &'static str {
    match self {
      SortType::New => "New",
    }
  }
}

/// Parameters for one page of `comment/list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentQuery {
  pub post_id: i64,
  pub community: String,
  pub max_depth: u32,
  pub sort: SortType,
  pub limit: u32,
  pub page: u32,
}
