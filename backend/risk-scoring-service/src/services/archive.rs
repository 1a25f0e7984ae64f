//! Raw event archive.
//!
//! Events are appended as JSON lines to a local buffer file. Every
//! `flush_every` events the file is fsynced, uploaded under a date-partitioned
//! key and replaced by a fresh file. The local copy is deleted only after a
//! confirmed upload. Archival never fails the caller: local I/O and upload
//! errors are logged and reported through [`RotationOutcome`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use credit_rules::RawEvent;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::storage::BlobStore;

const CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub enabled: bool,
    pub prefix: String,
    pub flush_every: usize,
    pub local_dir: PathBuf,
    pub bucket: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            prefix: "raw_events".to_string(),
            flush_every: 500,
            local_dir: PathBuf::from("tmp/raw_events"),
            bucket: "credit-risk-lake".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// Uploaded and removed locally.
    Uploaded { uri: String },
    /// Upload failed or was not possible; the file stays on disk.
    Retained { path: PathBuf },
    /// Nothing to upload.
    Empty,
}

struct Buffer {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: usize,
}

pub struct RawEventArchive<B: BlobStore> {
    store: Option<B>,
    prefix: String,
    flush_every: usize,
    local_dir: PathBuf,
    current: Option<Buffer>,
    seq: u64,
}

impl<B: BlobStore> RawEventArchive<B> {
    /// The first buffer file is opened by the first append or rotation.
    pub fn new(config: &ArchiveConfig, store: B) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let archive = Self {
            store: Some(store),
            prefix: config.prefix.trim_end_matches('/').to_string(),
            flush_every: config.flush_every.max(1),
            local_dir: config.local_dir.clone(),
            current: None,
            seq: 0,
        };
        info!(
            dir = %archive.local_dir.display(),
            prefix = %archive.prefix,
            flush_every = archive.flush_every,
            "Raw event archive enabled"
        );
        archive
    }

    /// An archive that accepts and discards everything.
    pub fn disabled() -> Self {
        Self {
            store: None,
            prefix: String::new(),
            flush_every: 1,
            local_dir: PathBuf::new(),
            current: None,
            seq: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Path of the file currently being written, if any.
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|b| b.path.as_path())
    }

    /// Append one event. Returns the rotation outcome when this append filled
    /// the buffer.
    pub async fn append(&mut self, event: &RawEvent) -> Option<RotationOutcome> {
        if !self.is_enabled() {
            return None;
        }
        if self.current.is_none() {
            self.open_buffer().await;
        }
        let buffer = self.current.as_mut()?;

        let mut line = match serde_json::to_vec(event) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Cannot serialize raw event for archive");
                return None;
            }
        };
        line.push(b'\n');
        if let Err(e) = buffer.writer.write_all(&line).await {
            warn!(path = %buffer.path.display(), error = %e, "Archive write failed");
            return None;
        }
        buffer.lines += 1;

        if buffer.lines >= self.flush_every {
            Some(self.flush_and_upload().await)
        } else {
            None
        }
    }

    /// Close the current file, try to upload it and start a new one.
    pub async fn flush_and_upload(&mut self) -> RotationOutcome {
        let outcome = self.rotate().await;
        if self.is_enabled() {
            self.open_buffer().await;
        }
        outcome
    }

    /// Final rotation; no new file is opened.
    pub async fn close(&mut self) -> RotationOutcome {
        let outcome = self.rotate().await;
        self.store = None;
        outcome
    }

    async fn rotate(&mut self) -> RotationOutcome {
        let Some(buffer) = self.current.take() else {
            return RotationOutcome::Empty;
        };
        let Buffer {
            path,
            writer,
            lines,
        } = buffer;

        if let Err(e) = sync_and_close(writer).await {
            warn!(path = %path.display(), error = %e, "Archive flush failed");
        }

        if lines == 0 {
            if let Err(e) = fs::remove_file(&path).await {
                debug!(path = %path.display(), error = %e, "Cannot remove empty archive file");
            }
            return RotationOutcome::Empty;
        }

        let Some(store) = self.store.as_ref() else {
            return RotationOutcome::Retained { path };
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let key = archive_key(&self.prefix, Utc::now(), &file_name);

        match store.put(&path, &key, CONTENT_TYPE).await {
            Ok(uri) => {
                info!(uri = %uri, events = lines, "Uploaded raw events");
                if let Err(e) = fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "Cannot remove uploaded archive file");
                }
                RotationOutcome::Uploaded { uri }
            }
            Err(e) => {
                warn!(
                    key = %key,
                    path = %path.display(),
                    events = lines,
                    error = %e,
                    "Raw event upload failed, keeping local file"
                );
                RotationOutcome::Retained { path }
            }
        }
    }

    async fn open_buffer(&mut self) {
        if let Err(e) = fs::create_dir_all(&self.local_dir).await {
            warn!(dir = %self.local_dir.display(), error = %e, "Cannot create archive directory");
        }

        let now = Utc::now();
        self.seq += 1;
        let path = self.local_dir.join(format!(
            "events_{}_{}_{}.jsonl",
            now.format("%H%M%S"),
            now.timestamp(),
            self.seq
        ));

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
        {
            Ok(file) => {
                debug!(path = %path.display(), "Opened archive buffer");
                self.current = Some(Buffer {
                    path,
                    writer: BufWriter::new(file),
                    lines: 0,
                });
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot open archive buffer");
                self.current = None;
            }
        }
    }
}

async fn sync_and_close(mut writer: BufWriter<File>) -> std::io::Result<()> {
    writer.flush().await?;
    writer.into_inner().sync_all().await
}

/// `{prefix}/{yyyy}/{mm}/{dd}/{file_name}`
pub fn archive_key(prefix: &str, at: DateTime<Utc>, file_name: &str) -> String {
    format!("{}/{}/{}", prefix, at.format("%Y/%m/%d"), file_name)
}
