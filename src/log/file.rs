//! Durable file-backed replicated log
//!
//! Append-only records, each framed with its index, a CRC32 of the data and
//! the data length. Opening the log scans every record: a torn record at the
//! tail (crash mid-append) is truncated away, a bad record anywhere else is
//! reported as corruption.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::LogSyncStrategy;
use crate::error::{IdError, Result};
use crate::protocol::{decode_content, encode_content};

use super::{LogEntry, RaftLog};

/// Index (8) + CRC (4) + Len (4)
pub const RECORD_HEADER_SIZE: u64 = 16;

/// Upper bound on a single record's data
const MAX_RECORD_SIZE: u32 = 16 * 1024 * 1024;

/// Outcome of scanning the log on open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecoveryResult {
    /// Number of intact records found
    pub entries_recovered: u64,

    /// Index of the last intact record, -1 if none
    pub last_index: i64,

    /// Whether a torn tail was cut off
    pub was_truncated: bool,
}

/// Replicated log stored in a single file
pub struct FileRaftLog {
    path: PathBuf,
    inner: Mutex<Inner>,
    recovery: LogRecoveryResult,
}

struct Inner {
    file: File,

    /// File offset of each record; position is the entry index
    offsets: Vec<u64>,

    end_offset: u64,

    sync_strategy: LogSyncStrategy,

    /// Appends since the last fsync
    unsynced: usize,
}

impl FileRaftLog {
    /// Open or create the log at `path`, recovering its index
    pub fn open(path: &Path, sync_strategy: LogSyncStrategy) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let (offsets, end_offset, was_truncated) = Self::scan(&file)?;

        if was_truncated {
            tracing::warn!(
                path = %path.display(),
                valid_bytes = end_offset,
                "Truncating torn tail of replicated log"
            );
            file.set_len(end_offset)?;
            file.sync_all()?;
        }

        let recovery = LogRecoveryResult {
            entries_recovered: offsets.len() as u64,
            last_index: offsets.len() as i64 - 1,
            was_truncated,
        };

        tracing::debug!(
            path = %path.display(),
            entries = recovery.entries_recovered,
            last_index = recovery.last_index,
            "Opened replicated log"
        );

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Inner {
                file,
                offsets,
                end_offset,
                sync_strategy,
                unsynced: 0,
            }),
            recovery,
        })
    }

    /// What the scan on open found
    pub fn recovery_result(&self) -> &LogRecoveryResult {
        &self.recovery
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Force sync to disk
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.file.sync_data()?;
        inner.unsynced = 0;
        Ok(())
    }

    /// Walk every record, returning offsets, the valid length and whether the
    /// tail must be cut
    fn scan(file: &File) -> Result<(Vec<u64>, u64, bool)> {
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut offsets = Vec::new();
        let mut position = 0u64;

        while position < file_len {
            if file_len - position < RECORD_HEADER_SIZE {
                return Ok((offsets, position, true));
            }

            let (index, crc, data_len) = read_header(&mut reader)?;
            let record_end = position + RECORD_HEADER_SIZE + u64::from(data_len);

            if data_len > MAX_RECORD_SIZE || record_end > file_len {
                if data_len > MAX_RECORD_SIZE && record_end <= file_len {
                    return Err(IdError::Corruption(format!(
                        "Record at offset {} claims {} bytes (max {})",
                        position, data_len, MAX_RECORD_SIZE
                    )));
                }
                return Ok((offsets, position, true));
            }

            let mut data = vec![0u8; data_len as usize];
            reader.read_exact(&mut data)?;

            if crc32fast::hash(&data) != crc {
                if record_end == file_len {
                    return Ok((offsets, position, true));
                }
                return Err(IdError::Corruption(format!(
                    "CRC mismatch in record at offset {} (index {})",
                    position, index
                )));
            }

            let expected = offsets.len() as u64;
            if index != expected {
                return Err(IdError::Corruption(format!(
                    "Log index gap at offset {}: expected {}, found {}",
                    position, expected, index
                )));
            }

            offsets.push(position);
            position = record_end;
        }

        Ok((offsets, position, false))
    }
}

impl RaftLog for FileRaftLog {
    fn append(&self, entry: LogEntry) -> Result<i64> {
        let mut inner = self.inner.lock();

        let expected = inner.offsets.len() as i64;
        if entry.index != expected {
            return Err(IdError::Corruption(format!(
                "Out of order append: expected index {}, got {}",
                expected, entry.index
            )));
        }

        let content = encode_content(&entry.content);
        let mut data = Vec::with_capacity(8 + content.len());
        data.extend_from_slice(&entry.term.to_be_bytes());
        data.extend_from_slice(&content);

        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE as usize + data.len());
        record.extend_from_slice(&(entry.index as u64).to_be_bytes());
        record.extend_from_slice(&crc32fast::hash(&data).to_be_bytes());
        record.extend_from_slice(&(data.len() as u32).to_be_bytes());
        record.extend_from_slice(&data);

        let offset = inner.end_offset;
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(&record)?;
        inner.offsets.push(offset);
        inner.end_offset = offset + record.len() as u64;
        inner.unsynced += 1;

        let should_sync = match inner.sync_strategy {
            LogSyncStrategy::EveryWrite => true,
            LogSyncStrategy::EveryNEntries { count } => inner.unsynced >= count,
        };
        if should_sync {
            inner.file.sync_data()?;
            inner.unsynced = 0;
        }

        Ok(entry.index)
    }

    fn read_entry(&self, index: i64) -> Result<Option<LogEntry>> {
        let mut inner = self.inner.lock();

        let offset = match usize::try_from(index).ok().and_then(|i| inner.offsets.get(i)) {
            Some(&offset) => offset,
            None => return Ok(None),
        };

        inner.file.seek(SeekFrom::Start(offset))?;
        let (stored_index, crc, data_len) = read_header(&mut inner.file)?;
        let mut data = vec![0u8; data_len as usize];
        inner.file.read_exact(&mut data)?;

        if stored_index != index as u64 || crc32fast::hash(&data) != crc || data.len() < 8 {
            return Err(IdError::Corruption(format!(
                "Record for index {} failed verification",
                index
            )));
        }

        let term = u64::from_be_bytes([
            data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
        ]);
        let content = decode_content(&data[8..])?;

        Ok(Some(LogEntry::new(term, index, content)))
    }

    fn append_index(&self) -> i64 {
        self.inner.lock().offsets.len() as i64 - 1
    }

    fn truncate(&self, from_index: i64) -> Result<()> {
        let mut inner = self.inner.lock();
        let from = from_index.max(0) as usize;
        if from >= inner.offsets.len() {
            return Ok(());
        }

        let new_end = inner.offsets[from];
        inner.file.set_len(new_end)?;
        inner.file.sync_all()?;
        inner.offsets.truncate(from);
        inner.end_offset = new_end;
        inner.unsynced = 0;

        tracing::info!(from_index = from_index, "Truncated replicated log");
        Ok(())
    }
}

fn read_header<R: Read>(reader: &mut R) -> Result<(u64, u32, u32)> {
    let mut header = [0u8; RECORD_HEADER_SIZE as usize];
    reader.read_exact(&mut header)?;

    let index = u64::from_be_bytes([
        header[0], header[1], header[2], header[3], header[4], header[5], header[6], header[7],
    ]);
    let crc = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
    let data_len = u32::from_be_bytes([header[12], header[13], header[14], header[15]]);

    Ok((index, crc, data_len))
}
