//! Durable state storage
//!
//! Stores the latest copy of one kind of state machine state. A write goes to
//! a temporary file that is synced and then renamed over the previous copy,
//! so a crash leaves either the old or the new state, never a mix.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use crate::error::{IdError, Result};

use super::StateMarshal;

/// CRC32 trailer
const CRC_SIZE: usize = 4;

/// Where a piece of state machine state survives restarts
pub trait StateStorage<T>: Send + Sync {
    /// The persisted state, or the marshal's start state if none exists
    fn initial_state(&self) -> Result<T>;

    /// Replace the persisted state
    fn persist_store_data(&self, state: &T) -> Result<()>;
}

/// State kept in a single file under a directory
pub struct FileStateStorage<T, M> {
    path: PathBuf,
    marshal: M,
    /// Serializes writers of the same file
    write_lock: Mutex<()>,
    _state: std::marker::PhantomData<fn() -> T>,
}

impl<T, M: StateMarshal<T>> FileStateStorage<T, M> {
    /// Create storage for `name` inside `dir` (created if missing)
    pub fn open(dir: &Path, name: &str, marshal: M) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(format!("{}.state", name)),
            marshal,
            write_lock: Mutex::new(()),
            _state: std::marker::PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("state.tmp")
    }
}

impl<T, M: StateMarshal<T>> StateStorage<T> for FileStateStorage<T, M> {
    fn initial_state(&self) -> Result<T> {
        if !self.path.exists() {
            return Ok(self.marshal.start_state());
        }

        let mut data = Vec::new();
        File::open(&self.path)?.read_to_end(&mut data)?;

        if data.len() < CRC_SIZE {
            return Err(IdError::Corruption(format!(
                "State file {} is too short ({} bytes)",
                self.path.display(),
                data.len()
            )));
        }

        let body_len = data.len() - CRC_SIZE;
        let stored_crc = u32::from_be_bytes([
            data[body_len],
            data[body_len + 1],
            data[body_len + 2],
            data[body_len + 3],
        ]);
        if crc32fast::hash(&data[..body_len]) != stored_crc {
            return Err(IdError::Corruption(format!(
                "CRC mismatch in state file {}",
                self.path.display()
            )));
        }

        data.truncate(body_len);
        let mut buf = Bytes::from(data);
        self.marshal.unmarshal(&mut buf)
    }

    fn persist_store_data(&self, state: &T) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut buf = BytesMut::new();
        self.marshal.marshal(state, &mut buf)?;
        let crc = crc32fast::hash(&buf);

        let temp_path = self.temp_path();
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(&buf)?;
            file.write_all(&crc.to_be_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;

        tracing::trace!(path = %self.path.display(), bytes = buf.len(), "Persisted state");
        Ok(())
    }
}

/// State kept in memory, for members without durable storage
pub struct InMemoryStateStorage<T> {
    state: Mutex<Option<T>>,
    start_state: T,
}

impl<T: Clone> InMemoryStateStorage<T> {
    pub fn new(start_state: T) -> Self {
        Self {
            state: Mutex::new(None),
            start_state,
        }
    }

    /// Whether anything was persisted yet
    pub fn has_persisted(&self) -> bool {
        self.state.lock().is_some()
    }
}

impl<T: Clone + Send> StateStorage<T> for InMemoryStateStorage<T>
where
    T: Sync,
{
    fn initial_state(&self) -> Result<T> {
        Ok(self
            .state
            .lock()
            .clone()
            .unwrap_or_else(|| self.start_state.clone()))
    }

    fn persist_store_data(&self, state: &T) -> Result<()> {
        *self.state.lock() = Some(state.clone());
        Ok(())
    }
}
