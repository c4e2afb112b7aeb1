//! Index of post ids already archived for a community.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use crate::lemmy::api_types::StoredPostLine;
use crate::lemmy::types::PostId;

/// Post ids present in a community's storage file.
///
/// Rebuilt from disk at the start of every cycle and never persisted.
#[derive(Debug, Default)]
pub struct SeenIndex {
  ids: HashSet<PostId>,
}

impl SeenIndex {
  /// Scan a storage file, parsing only each line's post id.
  ///
  /// A missing file yields an empty index. Any unparseable line is an error:
  /// a corrupt store must be noticed, not partially loaded.
  pub fn load(path: &Path) -> Result<Self> {
    let file = match File::open(path) {
      Ok(file) => file,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
      Err(e) => return Err(eyre!("Failed to open {}: {}", path.display(), e)),
    };

    let mut ids = HashSet::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
      let line_no = idx + 1;
      let line =
        line.map_err(|e| eyre!("{}:{}: failed to read line: {}", path.display(), line_no, e))?;
      let stored: StoredPostLine = serde_json::from_str(&line)
        .map_err(|e| eyre!("{}:{}: malformed post record: {}", path.display(), line_no, e))?;
      ids.insert(PostId(stored.post.id));
    }

    Ok(Self { ids })
  }

  pub fn contains(&self, id: PostId) -> bool {
    self.ids.contains(&id)
  }

  /// Returns false if the id was already present.
  pub fn insert(&mut self, id: PostId) -> bool {
    self.ids.insert(id)
  }

  pub fn len(&self) -> usize {
    self.ids.len()
  }
}
