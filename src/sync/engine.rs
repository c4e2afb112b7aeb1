//! Incremental sync of configured communities into their storage files.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::config::{AgeGranularity, Config};
use crate::lemmy::api::LemmyApi;
use crate::lemmy::api_types::SortType;
use crate::lemmy::types::Post;

use super::comments::collect_comments;
use super::seen::SeenIndex;
use super::store::PostStore;

/// Counters for one community within one cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommunityReport {
  pub pages: u32,
  pub listed: usize,
  pub already_seen: usize,
  pub too_recent: usize,
  pub accepted: usize,
}

impl fmt::Display for CommunityReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} pages, {} listed, {} seen, {} too recent, {} stored",
      self.pages, self.listed, self.already_seen, self.too_recent, self.accepted
    )
  }
}

/// Outcome of one community's sync.
#[derive(Debug)]
pub struct CommunityOutcome {
  pub community: String,
  pub result: Result<CommunityReport>,
}

/// Outcome of a full pass over all communities.
#[derive(Debug, Default)]
pub struct CycleReport {
  pub communities: Vec<CommunityOutcome>,
}

impl CycleReport {
  pub fn accepted(&self) -> usize {
    self
      .communities
      .iter()
      .filter_map(|c| c.result.as_ref().ok())
      .map(|r| r.accepted)
      .sum()
  }

  pub fn failures(&self) -> usize {
    self.communities.iter().filter(|c| c.result.is_err()).count()
  }
}

/// Whether a post is old enough to capture at `now`.
pub fn is_old_enough(
  published: DateTime<Utc>,
  now: DateTime<Utc>,
  min_age: chrono::Duration,
  granularity: AgeGranularity,
) -> bool {
  match granularity {
    AgeGranularity::Hours => (now - published).num_hours() >= min_age.num_hours(),
    AgeGranularity::Days => (now - published).num_days() * 24 >= min_age.num_hours(),
  }
}

/// Merge the listing outcome with the append result, keeping both errors
/// when both failed.
fn combine_outcome(outcome: Result<()>, appended: Result<usize>) -> Result<usize> {
  match (outcome, appended) {
    (Ok(()), appended) => appended,
    (Err(e), Ok(_)) => Err(e),
    (Err(e), Err(append_err)) => {
      Err(e.wrap_err(format!("Failed to store accepted posts: {}", append_err)))
    }
  }
}

/// Drives listing, filtering, comment collection and persistence.
pub struct SyncEngine<A: LemmyApi> {
  api: A,
  config: Config,
  store: PostStore,
}

impl<A: LemmyApi> SyncEngine<A> {
  pub fn new(api: A, config: Config) -> Self {
    let store = PostStore::new(config.data_dir.clone());
    Self { api, config, store }
  }

  #[cfg(test)]
  pub fn api(&self) -> &A {
    &self.api
  }

  #[cfg(test)]
  pub fn store(&self) -> &PostStore {
    &self.store
  }

  /// Sync every configured community once.
  ///
  /// A failing community is logged and followed by the error backoff; it never
  /// prevents the remaining communities from running.
  pub async fn run_cycle(&self) -> CycleReport {
    let mut report = CycleReport::default();

    for community in &self.config.communities {
      let result = self.sync_community(community, Utc::now()).await;

      match self.api.flush_request_log(&self.config.requests_file) {
        Ok(n) => debug!(community = %community, requests = n, "Flushed request log"),
        Err(e) => warn!(community = %community, error = %e, "Failed to flush request log"),
      }

      match &result {
        Ok(summary) => info!(community = %community, "Synced: {}", summary),
        Err(e) => {
          error!(community = %community, error = %e, "Sync failed");
          tokio::time::sleep(self.config.error_backoff()).await;
        }
      }

      report.communities.push(CommunityOutcome {
        community: community.clone(),
        result,
      });
    }

    report
  }

  /// Sync one community, treating `now` as the current time for age checks.
  ///
  /// Accepted posts are appended in listing order. If a page fails part way,
  /// the posts accepted before the failure are still appended and the error
  /// is returned.
  pub async fn sync_community(
    &self,
    community: &str,
    now: DateTime<Utc>,
  ) -> Result<CommunityReport> {
    let path = self.store.path_for(community);
    let mut seen = SeenIndex::load(&path)?;
    debug!(community = %community, known = seen.len(), "Loaded seen index");

    let mut report = CommunityReport::default();
    let mut accepted: Vec<Post> = Vec::new();

    let outcome = self
      .collect_new_posts(community, now, &mut seen, &mut accepted, &mut report)
      .await;

    if let Err(e) = &outcome {
      warn!(
        community = %community,
        error = %e,
        pending = accepted.len(),
        "Sync interrupted, storing posts accepted so far"
      );
    }
    let appended = self.store.append(community, &accepted);

    report.accepted = combine_outcome(outcome, appended)?;
    Ok(report)
  }

  async fn collect_new_posts(
    &self,
    community: &str,
    now: DateTime<Utc>,
    seen: &mut SeenIndex,
    accepted: &mut Vec<Post>,
    report: &mut CommunityReport,
  ) -> Result<()> {
    let min_age = self.config.min_post_age();

    for page in 1..=self.config.max_page {
      let views = self
        .api
        .list_posts(community, SortType::New, page, self.config.list_limit)
        .await?;
      report.pages += 1;
      report.listed += views.len();
      info!(community = %community, page, posts = views.len(), "Fetched page");

      for view in views {
        if seen.contains(Post::peek_id(&view)?) {
          report.already_seen += 1;
          continue;
        }

        let post = Post::from_view(view)?;

        if !is_old_enough(post.published, now, min_age, self.config.age_granularity) {
          debug!(
            community = %community,
            post_id = %post.id,
            published = %post.published,
            "Too recent, deferring"
          );
          report.too_recent += 1;
          continue;
        }

        let comments = if post.comment_count == 0 {
          Vec::new()
        } else {
          collect_comments(&self.api, post.id, community, post.comment_count).await?
        };
        debug!(
          community = %community,
          post_id = %post.id,
          remote_community = %post.community,
          comments = comments.len(),
          name = %post.name,
          "Accepted"
        );

        seen.insert(post.id);
        accepted.push(post.with_comments(comments));
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lemmy::types::PostId;
  use crate::sync::fake::{post_view, FakeApi};
  use chrono::Duration;

  const COMMUNITY: &str = "rust@lemmy.ml";

  fn config(dir: &std::path::Path, extra: &str) -> Config {
    let yaml = format!(
      "communities: [{}]\ndata_dir: {}\nrequests_file: {}\nrequest_interval: 0\nerror_backoff: 0\n{}",
      COMMUNITY,
      dir.join("data").display(),
      dir.join("data/requests.jsonl").display(),
      extra
    );
    Config::from_yaml(&yaml).unwrap()
  }

  fn stored_ids(engine: &SyncEngine<FakeApi>, community: &str) -> Vec<i64> {
    match std::fs::read_to_string(engine.store().path_for(community)) {
      Ok(contents) => contents
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["post"]["id"].as_i64().unwrap())
        .collect(),
      Err(_) => Vec::new(),
    }
  }

  #[tokio::test]
  async fn test_end_to_end_single_page() {
    let dir = tempfile::tempdir().unwrap();
    let now = Utc::now();
    let api = FakeApi::new();
    api.set_page(
      COMMUNITY,
      1,
      vec![
        post_view(1, 5, now - Duration::hours(1)),
        post_view(2, 0, now - Duration::hours(1)),
      ],
    );
    api.set_comments(1, 5, 50);

    let engine = SyncEngine::new(api, config(dir.path(), "max_page: 1\nlist_limit: 2\nmin_post_age: 0"));
    let report = engine.sync_community(COMMUNITY, now).await.unwrap();

    assert_eq!(report.accepted, 2);
    assert_eq!(stored_ids(&engine, COMMUNITY), vec![1, 2]);
    // Zero comments short-circuits collection.
    assert_eq!(engine.api().calls_matching("comments"), 1);

    let contents = std::fs::read_to_string(engine.store().path_for(COMMUNITY)).unwrap();
    let first: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
    assert_eq!(first["comments"].as_array().unwrap().len(), 5);

    let index = SeenIndex::load(&engine.store().path_for(COMMUNITY)).unwrap();
    assert_eq!(index.len(), 2);
    assert!(index.contains(PostId(1)));
    assert!(index.contains(PostId(2)));
  }

  #[tokio::test]
  async fn test_second_cycle_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let now = Utc::now();
    let api = FakeApi::new();
    api.set_page(
      COMMUNITY,
      1,
      vec![post_view(10, 2, now - Duration::days(3)), post_view(11, 0, now - Duration::days(3))],
    );
    api.set_comments(10, 2, 50);

    let engine = SyncEngine::new(api, config(dir.path(), "max_page: 1\nmin_post_age: 24"));
    assert_eq!(engine.sync_community(COMMUNITY, now).await.unwrap().accepted, 2);
    let comment_calls = engine.api().calls_matching("comments");

    let second = engine.sync_community(COMMUNITY, now).await.unwrap();
    assert_eq!(second.accepted, 0);
    assert_eq!(second.already_seen, 2);
    assert_eq!(engine.api().calls_matching("comments"), comment_calls);
    assert_eq!(stored_ids(&engine, COMMUNITY), vec![10, 11]);
  }

  #[tokio::test]
  async fn test_overlapping_pages_not_duplicated() {
    let dir = tempfile::tempdir().unwrap();
    let now = Utc::now();
    let old = now - Duration::days(2);
    let api = FakeApi::new();
    api.set_page(COMMUNITY, 1, vec![post_view(3, 1, old), post_view(2, 0, old)]);
    api.set_page(COMMUNITY, 2, vec![post_view(2, 0, old), post_view(1, 0, old)]);
    api.set_comments(3, 1, 50);

    let engine = SyncEngine::new(api, config(dir.path(), "max_page: 2"));
    let report = engine.sync_community(COMMUNITY, now).await.unwrap();

    assert_eq!(report.pages, 2);
    assert_eq!(report.listed, 4);
    assert_eq!(report.already_seen, 1);
    assert_eq!(stored_ids(&engine, COMMUNITY), vec![3, 2, 1]);
  }

  #[tokio::test]
  async fn test_recent_post_deferred_until_old_enough() {
    let dir = tempfile::tempdir().unwrap();
    let now = Utc::now();
    let published = now - Duration::hours(23);
    let api = FakeApi::new();
    api.set_page(COMMUNITY, 1, vec![post_view(7, 3, published)]);
    api.set_comments(7, 3, 50);

    let engine = SyncEngine::new(api, config(dir.path(), "max_page: 1\nmin_post_age: 24"));
    let first = engine.sync_community(COMMUNITY, now).await.unwrap();
    assert_eq!(first.too_recent, 1);
    assert_eq!(first.accepted, 0);
    assert!(stored_ids(&engine, COMMUNITY).is_empty());
    assert_eq!(engine.api().calls_matching("comments"), 0);

    let later = now + Duration::hours(1);
    let second = engine.sync_community(COMMUNITY, later).await.unwrap();
    assert_eq!(second.accepted, 1);
    assert_eq!(stored_ids(&engine, COMMUNITY), vec![7]);
  }

  #[tokio::test]
  async fn test_failed_page_keeps_earlier_posts() {
    let dir = tempfile::tempdir().unwrap();
    let now = Utc::now();
    let old = now - Duration::days(2);
    let api = FakeApi::new();
    api.set_page(COMMUNITY, 1, vec![post_view(5, 0, old)]);
    api.fail_page(COMMUNITY, 2);
    api.set_page(COMMUNITY, 3, vec![post_view(4, 0, old)]);

    let engine = SyncEngine::new(api, config(dir.path(), "max_page: 3"));
    let err = engine.sync_community(COMMUNITY, now).await.unwrap_err();
    assert!(err.to_string().contains("502"));
    assert_eq!(stored_ids(&engine, COMMUNITY), vec![5]);
    assert_eq!(engine.api().calls_matching("posts"), 2);
  }

  #[tokio::test]
  async fn test_corrupt_store_aborts_community() {
    let dir = tempfile::tempdir().unwrap();
    let api = FakeApi::new();
    let engine = SyncEngine::new(api, config(dir.path(), ""));
    std::fs::create_dir_all(dir.path().join("data")).unwrap();
    std::fs::write(engine.store().path_for(COMMUNITY), "{\"post\":{\"id\":1}}\n{\"po").unwrap();

    assert!(engine.sync_community(COMMUNITY, Utc::now()).await.is_err());
    assert!(engine.api().calls().is_empty());
  }

  #[tokio::test]
  async fn test_cycle_continues_past_failing_community() {
    let dir = tempfile::tempdir().unwrap();
    let now = Utc::now();
    let api = FakeApi::new();
    api.fail_page("broken@lemmy.ml", 1);
    api.set_page(COMMUNITY, 1, vec![post_view(1, 0, now - Duration::days(2))]);

    let mut cfg = config(dir.path(), "max_page: 1");
    cfg.communities = vec!["broken@lemmy.ml".to_string(), COMMUNITY.to_string()];
    let engine = SyncEngine::new(api, cfg);

    let report = engine.run_cycle().await;
    assert_eq!(report.failures(), 1);
    assert_eq!(report.accepted(), 1);
    assert_eq!(report.communities[0].community, "broken@lemmy.ml");
    assert!(report.communities[0].result.is_err());
    assert_eq!(stored_ids(&engine, COMMUNITY), vec![1]);
    // Request log is flushed once per community, failures included.
    assert_eq!(engine.api().flushes().len(), 2);
  }

  #[test]
  fn test_age_hours_granularity() {
    let now = Utc::now();
    let min = Duration::hours(24);
    assert!(!is_old_enough(now - Duration::hours(23), now, min, AgeGranularity::Hours));
    assert!(!is_old_enough(now - Duration::minutes(24 * 60 - 1), now, min, AgeGranularity::Hours));
    assert!(is_old_enough(now - Duration::hours(24), now, min, AgeGranularity::Hours));
    assert!(is_old_enough(now, now, Duration::zero(), AgeGranularity::Hours));
  }

  #[test]
  fn test_age_days_granularity() {
    use chrono::TimeZone;
    let now = Utc.with_ymd_and_hms(2024, 5, 2, 0, 30, 0).unwrap();
    let min = Duration::hours(24);
    // One hour ago, on the previous calendar day, is not a whole day old.
    assert!(!is_old_enough(now - Duration::hours(1), now, min, AgeGranularity::Days));
    assert!(!is_old_enough(now - Duration::hours(23), now, min, AgeGranularity::Days));
    assert!(is_old_enough(now - Duration::hours(24), now, min, AgeGranularity::Days));
    assert!(!is_old_enough(now - Duration::hours(47), now, Duration::hours(48), AgeGranularity::Days));
    assert!(is_old_enough(now - Duration::hours(49), now, Duration::hours(48), AgeGranularity::Days));
  }

  #[tokio::test]
  async fn test_days_granularity_defers_post_across_midnight() {
    use chrono::TimeZone;
    let dir = tempfile::tempdir().unwrap();
    let now = Utc.with_ymd_and_hms(2024, 5, 2, 0, 30, 0).unwrap();
    let api = FakeApi::new();
    api.set_page(COMMUNITY, 1, vec![post_view(1, 0, now - Duration::hours(1))]);

    let engine = SyncEngine::new(
      api,
      config(dir.path(), "max_page: 1\nmin_post_age: 24\nage_granularity: days"),
    );
    let report = engine.sync_community(COMMUNITY, now).await.unwrap();
    assert_eq!(report.accepted, 0);
    assert_eq!(report.too_recent, 1);
    assert!(stored_ids(&engine, COMMUNITY).is_empty());
  }

  #[tokio::test]
  async fn test_seen_post_with_bad_fields_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let now = Utc::now();
    let api = FakeApi::new();
    let mut broken = post_view(1, 0, now);
    broken.insert(
      "post".to_string(),
      serde_json::json!({ "id": 1, "name": "x", "published": "garbage" }),
    );
    api.set_page(COMMUNITY, 1, vec![broken, post_view(2, 0, now - Duration::days(3))]);

    let engine = SyncEngine::new(api, config(dir.path(), "max_page: 1"));
    std::fs::create_dir_all(dir.path().join("data")).unwrap();
    std::fs::write(engine.store().path_for(COMMUNITY), "{\"post\":{\"id\":1}}\n").unwrap();

    let report = engine.sync_community(COMMUNITY, now).await.unwrap();
    assert_eq!(report.already_seen, 1);
    assert_eq!(report.accepted, 1);
    assert_eq!(stored_ids(&engine, COMMUNITY), vec![1, 2]);
  }

  #[test]
  fn test_combine_outcome_keeps_both_errors() {
    use color_eyre::eyre::eyre;

    assert_eq!(combine_outcome(Ok(()), Ok(3)).unwrap(), 3);
    assert!(combine_outcome(Ok(()), Err(eyre!("disk full"))).is_err());

    let err = combine_outcome(Err(eyre!("API returned 502")), Ok(1)).unwrap_err();
    assert!(format!("{:#}", err).contains("502"));

    let err = combine_outcome(Err(eyre!("API returned 502")), Err(eyre!("disk full"))).unwrap_err();
    let chain = format!("{:#}", err);
    assert!(chain.contains("502"), "{}", chain);
    assert!(chain.contains("disk full"), "{}", chain);
  }
}
