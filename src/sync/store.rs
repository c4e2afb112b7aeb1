//! Append-only JSONL storage, one file per community.

use color_eyre::{eyre::eyre, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use crate::lemmy::types::Post;

#[derive(Debug, Clone)]
pub struct PostStore {
  dir: PathBuf,
}

impl PostStore {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  /// Storage file for a community: `<dir>/posts_<community>.jsonl`
  pub fn path_for(&self, community: &str) -> PathBuf {
    self.dir.join(format!("posts_{}.jsonl", community))
  }

  /// Append posts in order, one JSON object per line.
  ///
  /// The batch is serialized up front and written with a single call so a
  /// serialization failure never leaves a partial batch behind.
  pub fn append(&self, community: &str, posts: &[Post]) -> Result<usize> {
    if posts.is_empty() {
      return Ok(0);
    }

    let mut buf = String::new();
    for post in posts {
      buf.push_str(&post.to_json_line()?);
      buf.push('\n');
    }

    std::fs::create_dir_all(&self.dir)
      .map_err(|e| eyre!("Failed to create data directory {}: {}", self.dir.display(), e))?;

    let path = self.path_for(community);
    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(&path)
      .map_err(|e| eyre!("Failed to open {}: {}", path.display(), e))?;

    file
      .write_all(buf.as_bytes())
      .and_then(|_| file.flush())
      .map_err(|e| eyre!("Failed to append to {}: {}", path.display(), e))?;

    Ok(posts.len())
  }
}
