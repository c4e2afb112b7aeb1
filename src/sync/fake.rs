//! In-memory `LemmyApi` used by the sync tests.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use crate::lemmy::api::LemmyApi;
use crate::lemmy::api_types::{ApiCommunityResponse, ApiSiteResponse, CommentQuery, SortType};
use crate::lemmy::types::Comment;

/// Build a post view the way `post/list` returns it.
pub fn post_view(id: i64, comments: u64, published: DateTime<Utc>) -> Map<String, Value> {
  let value = json!({
    "post": {
      "id": id,
      "name": format!("post {}", id),
      "published": published.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
    },
    "community": { "name": "rust" },
    "counts": { "comments": comments },
  });
  match value {
    Value::Object(map) => map,
    _ => Map::new(),
  }
}

pub fn comment(post_id: i64, n: usize) -> Comment {
  json!({ "comment": { "id": post_id * 1000 + n as i64, "post_id": post_id } })
}

#[derive(Default)]
pub struct FakeApi {
  posts: Mutex<HashMap<(String, u32), Vec<Map<String, Value>>>>,
  comment_pages: Mutex<HashMap<i64, Vec<Vec<Comment>>>>,
  failing_pages: Mutex<HashSet<(String, u32)>>,
  failing_communities: Mutex<HashSet<String>>,
  calls: Mutex<Vec<String>>,
  flushes: Mutex<Vec<usize>>,
}

impl FakeApi {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_page(&self, community: &str, page: u32, posts: Vec<Map<String, Value>>) {
    self
      .posts
      .lock()
      .unwrap()
      .insert((community.to_string(), page), posts);
  }

  /// Serve `count` comments for a post split into pages of `page_size`.
  pub fn set_comments(&self, post_id: i64, count: usize, page_size: usize) {
    let all: Vec<Comment> = (0..count).map(|n| comment(post_id, n)).collect();
    let pages = all.chunks(page_size.max(1)).map(|c| c.to_vec()).collect();
    self.set_comment_pages(post_id, pages);
  }

  pub fn set_comment_pages(&self, post_id: i64, pages: Vec<Vec<Comment>>) {
    self.comment_pages.lock().unwrap().insert(post_id, pages);
  }

  pub fn fail_page(&self, community: &str, page: u32) {
    self
      .failing_pages
      .lock()
      .unwrap()
      .insert((community.to_string(), page));
  }

  pub fn fail_community(&self, name: &str) {
    self
      .failing_communities
      .lock()
      .unwrap()
      .insert(name.to_string());
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  pub fn calls_matching(&self, prefix: &str) -> usize {
    self
      .calls()
      .iter()
      .filter(|c| c.starts_with(prefix))
      .count()
  }

  pub fn flushes(&self) -> Vec<usize> {
    self.flushes.lock().unwrap().clone()
  }

  fn record(&self, call: String) {
    self.calls.lock().unwrap().push(call);
  }
}

impl LemmyApi for FakeApi {
  async fn site(&self) -> Result<ApiSiteResponse> {
    self.record("site".to_string());
    Ok(serde_json::from_value(json!({ "site_view": { "site": { "name": "Fake" } } }))?)
  }

  async fn community(&self, name: &str) -> Result<ApiCommunityResponse> {
    self.record(format!("community {}", name));
    if self.failing_communities.lock().unwrap().contains(name) {
      return Err(eyre!("API returned 404: couldnt_find_community"));
    }
    Ok(serde_json::from_value(json!({
      "community_view": { "community": { "name": name }, "counts": { "subscribers": 3 } }
    }))?)
  }

  async fn list_posts(
    &self,
    community: &str,
    sort: SortType,
    page: u32,
    _limit: u32,
  ) -> Result<Vec<Map<String, Value>>> {
    assert_eq!(sort, SortType::New);
    self.record(format!("posts {} {}", community, page));
    let key = (community.to_string(), page);
    if self.failing_pages.lock().unwrap().contains(&key) {
      return Err(eyre!("API returned 502: bad gateway"));
    }
    Ok(self.posts.lock().unwrap().get(&key).cloned().unwrap_or_default())
  }

  async fn list_comments(&self, query: &CommentQuery) -> Result<Vec<Comment>> {
    self.record(format!("comments {} {}", query.post_id, query.page));
    let pages = self.comment_pages.lock().unwrap();
    let page = pages
      .get(&query.post_id)
      .and_then(|p| p.get(query.page as usize - 1))
      .cloned()
      .unwrap_or_default();
    Ok(page)
  }

  fn flush_request_log(&self, _path: &Path) -> Result<usize> {
    let calls = self.calls.lock().unwrap().len();
    self.flushes.lock().unwrap().push(calls);
    Ok(calls)
  }
}
