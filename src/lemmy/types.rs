use chrono::{DateTime, NaiveDateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde_json::{Map, Value};
use std::fmt;

use serde::Deserialize;

use super::api_types::{reserialize, ApiPostView, StoredPostId};

/// Remote post identifier, unique per instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PostId(pub i64);

impl fmt::Display for PostId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

/// A comment payload, archived verbatim
pub type Comment = Value;

/// A post view as returned by `post/list`, plus the comments collected for it.
#[derive(Debug, Clone)]
pub struct Post {
  pub id: PostId,
  pub name: String,
  pub published: DateTime<Utc>,
  pub community: String,
  /// Server-reported comment count at listing time
  pub comment_count: u64,
  /// None until comments have been collected
  pub comments: Option<Vec<Comment>>,
  raw: Map<String, Value>,
}

impl Post {
  /// Read only `post.id` from a raw listing entry.
  pub fn peek_id(raw: &Map<String, Value>) -> Result<PostId> {
    let post = raw
      .get("post")
      .ok_or_else(|| eyre!("Failed to parse post view: missing field `post`"))?;
    let stored =
      StoredPostId::deserialize(post).map_err(|e| eyre!("Failed to parse post id: {}", e))?;
    Ok(PostId(stored.id))
  }

  /// Build a post from a raw listing entry, keeping the payload for archival.
  pub fn from_view(raw: Map<String, Value>) -> Result<Self> {
    let view: ApiPostView =
      reserialize(&raw).map_err(|e| eyre!("Failed to parse post view: {}", e))?;
    let published = parse_published(&view.post.published)?;

    Ok(Self {
      id: PostId(view.post.id),
      name: view.post.name,
      published,
      community: view.community.name,
      comment_count: view.counts.comments,
      comments: None,
      raw,
    })
  }

  /// Attach collected comments.
  pub fn with_comments(mut self, comments: Vec<Comment>) -> Self {
    self.comments = Some(comments);
    self
  }

  /// Serialize to one storage line: the original view with a `comments` array.
  pub fn to_json_line(&self) -> Result<String> {
    let mut object = self.raw.clone();
    object.insert(
      "comments".to_string(),
      Value::Array(self.comments.clone().unwrap_or_default()),
    );
    serde_json::to_string(&Value::Object(object))
      .map_err(|e| eyre!("Failed to serialize post {}: {}", self.id, e))
  }
}

/// Parse a Lemmy timestamp. Older servers send naive UTC timestamps
/// ("2023-10-01T12:34:56.123456"), newer ones RFC 3339 with an offset.
pub fn parse_published(s: &str) -> Result<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse publication date '{}': {}", s, e))
}
