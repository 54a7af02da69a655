//! File-backed Db using an append-only batch log.
//!
//! Every applied [`WriteBatch`] becomes one length-prefixed record in the
//! log; opening the database replays the log into an in-memory map. A torn
//! trailing record (crash mid-append) is truncated away; a corrupt record
//! body is an error.

use crate::batch::{BatchOp, WriteBatch};
use crate::db::Db;
use crate::error::{DbError, DbResult};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes identifying a FolioDB batch log.
const LOG_MAGIC: [u8; 4] = *b"FLOG";

/// Current log format version.
const LOG_VERSION: u16 = 1;

const HEADER_LEN: u64 = 6;

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;

/// A persistent [`Db`] backed by an append-only record log.
///
/// Holds an exclusive advisory lock on the log file for the lifetime of the
/// handle, so two processes cannot open the same page database.
pub struct FileDb {
    path: PathBuf,
    file: Mutex<File>,
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl FileDb {
    /// Opens or creates a file-backed database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Locked`] if another process holds the file lock,
    /// and [`DbError::Corrupt`] if the log header or a record body is
    /// malformed.
    pub fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        file.try_lock_exclusive().map_err(|_| DbError::Locked)?;

        let len = file.metadata()?.len();
        let mut data = BTreeMap::new();

        if len == 0 {
            let mut header = Vec::with_capacity(HEADER_LEN as usize);
            header.extend_from_slice(&LOG_MAGIC);
            header.extend_from_slice(&LOG_VERSION.to_le_bytes());
            file.write_all(&header)?;
            file.sync_all()?;
        } else {
            let good_end = Self::replay(&mut file, len, &mut data)?;
            if good_end < len {
                // Torn tail from a crash mid-append.
                file.set_len(good_end)?;
                file.sync_all()?;
            }
        }

        file.seek(SeekFrom::End(0))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            data: RwLock::new(data),
        })
    }

    /// Returns the path to the underlying log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replays the log into `data`, returning the offset past the last
    /// complete record.
    fn replay(file: &mut File, len: u64, data: &mut BTreeMap<Vec<u8>, Vec<u8>>) -> DbResult<u64> {
        if len < HEADER_LEN {
            return Err(DbError::corrupt("log shorter than header"));
        }

        file.seek(SeekFrom::Start(0))?;
        let mut header = [0u8; HEADER_LEN as usize];
        file.read_exact(&mut header)?;
        if header[..4] != LOG_MAGIC {
            return Err(DbError::corrupt("bad log magic"));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != LOG_VERSION {
            return Err(DbError::corrupt(format!(
                "unsupported log version {version}"
            )));
        }

        let mut offset = HEADER_LEN;
        loop {
            if offset + 4 > len {
                return Ok(offset);
            }
            let mut len_buf = [0u8; 4];
            file.read_exact(&mut len_buf)?;
            let payload_len = u32::from_le_bytes(len_buf) as u64;
            if offset + 4 + payload_len > len {
                return Ok(offset);
            }

            let mut payload = vec![0u8; payload_len as usize];
            file.read_exact(&mut payload)?;
            Self::apply_record(&payload, data)?;
            offset += 4 + payload_len;
        }
    }

    /// Decodes one record payload and applies it to `data`.
    fn apply_record(payload: &[u8], data: &mut BTreeMap<Vec<u8>, Vec<u8>>) -> DbResult<()> {
        let mut pos = 0usize;

        let read_u32 = |payload: &[u8], pos: &mut usize| -> DbResult<u32> {
            let end = *pos + 4;
            let bytes: [u8; 4] = payload
                .get(*pos..end)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| DbError::corrupt("record truncated"))?;
            *pos = end;
            Ok(u32::from_le_bytes(bytes))
        };
        let read_bytes = |payload: &[u8], pos: &mut usize, n: usize| -> DbResult<Vec<u8>> {
            let end = *pos + n;
            let bytes = payload
                .get(*pos..end)
                .ok_or_else(|| DbError::corrupt("record truncated"))?
                .to_vec();
            *pos = end;
            Ok(bytes)
        };

        let op_count = read_u32(payload, &mut pos)?;
        for _ in 0..op_count {
            let tag = *payload
                .get(pos)
                .ok_or_else(|| DbError::corrupt("record truncated"))?;
            pos += 1;
            let key_len = read_u32(payload, &mut pos)? as usize;
            let key = read_bytes(payload, &mut pos, key_len)?;
            match tag {
                OP_PUT => {
                    let value_len = read_u32(payload, &mut pos)? as usize;
                    let value = read_bytes(payload, &mut pos, value_len)?;
                    data.insert(key, value);
                }
                OP_DELETE => {
                    data.remove(&key);
                }
                other => {
                    return Err(DbError::corrupt(format!("unknown record op tag {other}")));
                }
            }
        }
        Ok(())
    }

    /// Encodes a batch as one record payload.
    fn encode_record(batch: &WriteBatch) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(batch.len() as u32).to_le_bytes());
        for op in batch.ops() {
            match op {
                BatchOp::Put { key, value } => {
                    payload.push(OP_PUT);
                    payload.extend_from_slice(&(key.len() as u32).to_le_bytes());
                    payload.extend_from_slice(key);
                    payload.extend_from_slice(&(value.len() as u32).to_le_bytes());
                    payload.extend_from_slice(value);
                }
                BatchOp::Delete { key } => {
                    payload.push(OP_DELETE);
                    payload.extend_from_slice(&(key.len() as u32).to_le_bytes());
                    payload.extend_from_slice(key);
                }
            }
        }
        payload
    }
}

impl Db for FileDb {
    fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn apply(&self, batch: WriteBatch) -> DbResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let payload = Self::encode_record(&batch);
        let mut record = Vec::with_capacity(4 + payload.len());
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(&payload);

        // Durable before visible: the record hits disk first, then the map.
        let mut file = self.file.lock();
        file.write_all(&record)?;
        file.sync_data()?;

        let mut data = self.data.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let data = self.data.read();
        Ok(data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

impl Drop for FileDb {
    fn drop(&mut self) {
        let _ = self.file.lock().unlock();
    }
}
