use color_eyre::Result;
use serde_json::{Map, Value};
use std::path::Path;

use super::api_types::{ApiCommunityResponse, ApiSiteResponse, CommentQuery, SortType};
use super::types::Comment;

/// Read operations the sync engine needs from a Lemmy instance.
///
/// Implementations must serialize calls: at most one request is in flight
/// and consecutive requests honour the configured spacing.
#[allow(async_fn_in_trait)]
pub trait LemmyApi {
  /// Site metadata (`GET /site`)
  async fn site(&self) -> Result<ApiSiteResponse>;

  /// Community metadata (`GET /community?name=`)
  async fn community(&self, name: &str) -> Result<ApiCommunityResponse>;

  /// One page of `post/list` for a community, as raw post views.
  async fn list_posts(
    &self,
    community: &str,
    sort: SortType,
    page: u32,
    limit: u32,
  ) -> Result<Vec<Map<String, Value>>>;

  /// One page of `comment/list`.
  async fn list_comments(&self, query: &CommentQuery) -> Result<Vec<Comment>>;

  /// Append the requests issued since the last flush to `path`.
  fn flush_request_log(&self, path: &Path) -> Result<usize>;
}
