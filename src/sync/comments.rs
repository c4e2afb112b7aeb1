//! Comment collection for a single post.

use color_eyre::Result;
use tracing::debug;

use crate::lemmy::api::LemmyApi;
use crate::lemmy::api_types::{CommentQuery, SortType};
use crate::lemmy::types::{Comment, PostId};

pub const COMMENT_PAGE_SIZE: u32 = 50;
pub const COMMENT_MAX_DEPTH: u32 = 8;

/// Page through `comment/list` until `expected` comments are gathered or the
/// server returns an empty page.
///
/// An empty page always ends the loop, so an overstated `expected` cannot
/// cause unbounded paging.
pub async fn collect_comments<A: LemmyApi>(
  api: &A,
  post_id: PostId,
  community: &str,
  expected: u64,
) -> Result<Vec<Comment>> {
  let mut comments: Vec<Comment> = Vec::new();
  let mut page = 1u32;

  loop {
    let query = CommentQuery {
      post_id: post_id.0,
      community: community.to_string(),
      max_depth: COMMENT_MAX_DEPTH,
      sort: SortType::New,
      limit: COMMENT_PAGE_SIZE,
      page,
    };
    let batch = api.list_comments(&query).await?;
    let batch_len = batch.len();
    comments.extend(batch);

    debug!(post_id = %post_id, page, batch_len, total = comments.len(), expected, "Comment page");

    if batch_len == 0 || comments.len() as u64 >= expected {
      break;
    }
    page += 1;
  }

  Ok(comments)
}
