//! Append-only journal that makes the write queue survive restarts.
//!
//! Frames are `[u32 little-endian length][MessagePack entry]`. Replaying every
//! frame in order rebuilds the queue; once enough frames pile up the journal
//! is compacted down to one `Enqueued` frame per live item.

use super::queue::{QueueItem, WriteQueue};
use crate::core::{EvaError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_COMPACTION_THRESHOLD: usize = 256;
/// Anything larger is treated as a corrupt length prefix.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalEntry {
    Enqueued(QueueItem),
    Retried { slot: String, seq: u64, retry_count: u32 },
    Removed { slot: String, seq: u64 },
}

pub struct QueueJournal {
    path: PathBuf,
    file: BufWriter<File>,
    entries_since_compaction: usize,
    compaction_threshold: usize,
}

impl QueueJournal {
    /// Opens (or creates) the journal and returns it with the replayed queue.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<(Self, WriteQueue)> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                EvaError::storage(format!("Failed to create journal directory: {}", e))
            })?;
        }

        let Replay { entries, valid_len } = read_entries(&path)?;
        let replayed = entries.len();
        let mut queue = WriteQueue::new();
        for entry in entries {
            apply(&mut queue, entry);
        }
        debug!(path = %path.display(), frames = replayed, pending = queue.len(), "sync journal replayed");

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| EvaError::storage(format!("Failed to open sync journal: {}", e)))?;
        truncate_torn_tail(&file, &path, valid_len)?;

        Ok((
            Self {
                path,
                file: BufWriter::new(file),
                entries_since_compaction: replayed,
                compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            },
            queue,
        ))
    }

    pub fn set_compaction_threshold(&mut self, threshold: usize) {
        self.compaction_threshold = threshold.max(1);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, entry: &JournalEntry) -> Result<()> {
        write_frame(&mut self.file, entry)?;
        self.file
            .flush()
            .map_err(|e| EvaError::storage(format!("Failed to flush sync journal: {}", e)))?;
        self.entries_since_compaction += 1;
        Ok(())
    }

    pub fn needs_compaction(&self) -> bool {
        self.entries_since_compaction >= self.compaction_threshold
    }

    /// Rewrites the journal so it holds only the queue's live items.
    pub fn compact(&mut self, queue: &WriteQueue) -> Result<()> {
        let temp_path = self.path.with_extension("tmp");
        {
            let temp_file = File::create(&temp_path)
                .map_err(|e| EvaError::storage(format!("Failed to create temp journal: {}", e)))?;
            let mut writer = BufWriter::new(temp_file);
            for item in queue.items() {
                write_frame(&mut writer, &JournalEntry::Enqueued(item))?;
            }
            writer
                .flush()
                .map_err(|e| EvaError::storage(format!("Failed to flush temp journal: {}", e)))?;
            writer
                .get_mut()
                .sync_all()
                .map_err(|e| EvaError::storage(format!("Failed to sync temp journal: {}", e)))?;
        }
        fs::rename(&temp_path, &self.path)
            .map_err(|e| EvaError::storage(format!("Failed to replace sync journal: {}", e)))?;

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| EvaError::storage(format!("Failed to reopen sync journal: {}", e)))?;
        self.file = BufWriter::new(file);
        self.entries_since_compaction = queue.len();
        debug!(live = queue.len(), "sync journal compacted");
        Ok(())
    }
}

fn apply(queue: &mut WriteQueue, entry: JournalEntry) {
    match entry {
        JournalEntry::Enqueued(item) => queue.restore(item),
        JournalEntry::Retried {
            slot,
            seq,
            retry_count,
        } => queue.set_retry_count(&slot, seq, retry_count),
        JournalEntry::Removed { slot, seq } => {
            queue.remove_if_current(&slot, seq);
        }
    }
}

fn write_frame<W: Write>(writer: &mut W, entry: &JournalEntry) -> Result<()> {
    let serialized = rmp_serde::to_vec(entry)?;
    let len = serialized.len() as u32;
    writer
        .write_all(&len.to_le_bytes())
        .and_then(|_| writer.write_all(&serialized))
        .map_err(|e| EvaError::storage(format!("Failed to write sync journal: {}", e)))
}

struct Replay {
    entries: Vec<JournalEntry>,
    /// Byte offset just past the last complete frame.
    valid_len: u64,
}

fn read_entries(path: &Path) -> Result<Replay> {
    let mut replay = Replay {
        entries: Vec::new(),
        valid_len: 0,
    };
    if !path.exists() {
        return Ok(replay);
    }
    let file = File::open(path)
        .map_err(|e| EvaError::storage(format!("Failed to open sync journal: {}", e)))?;
    let mut reader = BufReader::new(file);
    loop {
        let mut len_bytes = [0u8; 4];
        match reader.read_exact(&mut len_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => {
                return Err(EvaError::storage(format!(
                    "Failed to read journal frame length: {}",
                    e
                )));
            }
        }
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_FRAME_LEN {
            warn!(path = %path.display(), len, "sync journal frame length out of range, discarding tail");
            break;
        }
        let mut data = vec![0u8; len];
        match reader.read_exact(&mut data) {
            Ok(()) => {}
            // Torn tail from a crash mid-append.
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                warn!(path = %path.display(), "sync journal ends with a partial frame");
                break;
            }
            Err(e) => {
                return Err(EvaError::storage(format!(
                    "Failed to read journal frame: {}",
                    e
                )));
            }
        }
        replay.entries.push(rmp_serde::from_slice(&data)?);
        replay.valid_len += (4 + len) as u64;
    }
    Ok(replay)
}

/// Cuts off bytes after the last complete frame so new appends stay readable.
fn truncate_torn_tail(file: &File, path: &Path, valid_len: u64) -> Result<()> {
    let actual_len = file
        .metadata()
        .map_err(|e| EvaError::storage(format!("Failed to stat sync journal: {}", e)))?
        .len();
    if actual_len > valid_len {
        warn!(
            path = %path.display(),
            discarded = actual_len - valid_len,
            "truncating sync journal to its last complete frame"
        );
        file.set_len(valid_len)
            .map_err(|e| EvaError::storage(format!("Failed to truncate sync journal: {}", e)))?;
    }
    Ok(())
}
