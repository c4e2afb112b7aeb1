//! In-memory log of issued requests, flushed to a shared JSONL file.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// One issued remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
  pub date: DateTime<Utc>,
  pub url: String,
}

/// Requests issued since the last flush, in issue order.
#[derive(Debug, Default)]
pub struct RequestLog {
  records: Vec<RequestRecord>,
}

impl RequestLog {
  pub fn record(&mut self, url: &str) {
    self.records.push(RequestRecord {
      date: Utc::now(),
      url: url.to_string(),
    });
  }

  /// Append buffered records to `path` and clear the buffer.
  ///
  /// Records stay buffered if the file cannot be opened. Once a write has been
  /// attempted they are dropped, so a failed write is never repeated as
  /// duplicate lines. Returns the number of records written.
  pub fn flush(&mut self, path: &Path) -> Result<usize> {
    if self.records.is_empty() {
      return Ok(0);
    }

    let mut buf = String::new();
    for record in &self.records {
      let line = serde_json::to_string(record)
        .map_err(|e| eyre!("Failed to serialize request record: {}", e))?;
      buf.push_str(&line);
      buf.push('\n');
    }

    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create directory {}: {}", parent.display(), e))?;
    }

    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(path)
      .map_err(|e| eyre!("Failed to open request log {}: {}", path.display(), e))?;

    let records = std::mem::take(&mut self.records);
    file.write_all(buf.as_bytes()).and_then(|_| file.flush()).map_err(|e| {
      eyre!(
        "Failed to write request log {} ({} records dropped): {}",
        path.display(),
        records.len(),
        e
      )
    })?;

    Ok(records.len())
  }
}
