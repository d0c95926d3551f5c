//! # Record Store Module
//!
//! Durable, sequence-numbered log of telemetry records kept while the
//! network is down.
//!
//! This module handles:
//! - Mounting the storage root and recovering the next sequence id
//! - Writing one file per record, named by its zero-padded id
//! - Counting, listing, reading and deleting retained records
//! - Serializing every operation behind a single guard
//!
//! Sequence ids wrap to zero once the counter reaches `max_sequence_id`. A
//! wrapped id overwrites any record still stored under it.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::record::codec::{decode_record, encode_record, RECORD_SIZE};
use crate::record::{RecordId, TelemetryRecord};

/// Default sequence limit: every id fits in eight decimal digits
pub const DEFAULT_MAX_SEQUENCE_ID: u32 = 100_000_000;

/// State that only exists while the storage root is mounted
#[derive(Debug)]
struct Mount {
    root: PathBuf,
    next_id: u32,
}

/// Records read by [`RecordStore::read_batch`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadBatch {
    /// Records that were read in full, in ascending id order
    pub records: Vec<(RecordId, TelemetryRecord)>,
    /// Number of ids the caller asked for
    pub requested: usize,
}

impl ReadBatch {
    /// Number of requested ids that were successfully read
    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// True if fewer records were read than requested
    pub fn is_partial(&self) -> bool {
        self.count() < self.requested
    }

    /// Ids of the records actually read
    pub fn ids(&self) -> BTreeSet<RecordId> {
        self.records.iter().map(|(id, _)| *id).collect()
    }

    /// The records without their ids
    pub fn to_records(&self) -> Vec<TelemetryRecord> {
        self.records.iter().map(|(_, record)| *record).collect()
    }
}

/// Durable record store on a mounted storage root.
///
/// Owned by the sync controller; there is no process-wide instance. All
/// operations take `&self` and serialize on an internal mutex, so the store
/// may be shared behind an `Arc` if more than one task ever needs it.
/// Operations are not reentrant.
#[derive(Debug)]
pub struct RecordStore {
    root: PathBuf,
    max_sequence_id: u32,
    mount: Mutex<Option<Mount>>,
}

impl RecordStore {
    /// Create a store for the given root. Nothing touches the medium until
    /// [`open`](Self::open) is called.
    ///
    /// # Arguments
    ///
    /// * `root` - Mount point holding the record files
    /// * `max_sequence_id` - Ids run from 0 up to, but excluding, this value
    pub fn new(root: impl Into<PathBuf>, max_sequence_id: u32) -> Self {
        Self {
            root: root.into(),
            max_sequence_id: max_sequence_id.max(1),
            mount: Mutex::new(None),
        }
    }

    /// Mount point this store was created for
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Mount the storage root and recover the sequence counter.
    ///
    /// The next id becomes `max(existing ids) + 1`, or 0 for an empty store.
    /// Calling `open` on an already open store does nothing.
    ///
    /// # Errors
    ///
    /// Returns `MountFailed` if the root does not exist or is not a
    /// directory, or a directory error if the initial scan fails. The store
    /// stays closed in both cases.
    pub fn open(&self) -> Result<(), StoreError> {
        let mut mount = self.lock();
        if mount.is_some() {
            debug!("Record store at {} already open", self.root.display());
            return Ok(());
        }

        info!("Mounting record store on {}", self.root.display());
        let metadata = fs::metadata(&self.root).map_err(|source| {
            error!("Failed to mount {}: {}", self.root.display(), source);
            StoreError::MountFailed {
                path: self.root.clone(),
                source,
            }
        })?;
        if !metadata.is_dir() {
            error!("Failed to mount {}: not a directory", self.root.display());
            return Err(StoreError::MountFailed {
                path: self.root.clone(),
                source: io::Error::new(io::ErrorKind::Other, "mount point is not a directory"),
            });
        }

        let existing = scan(&self.root)?;
        let next_id = match existing.last() {
            Some((RecordId(max), _)) => self.advance(*max),
            None => 0,
        };

        info!(
            "Record store mounted with {} record(s), next sequence id {:08}",
            existing.len(),
            next_id
        );
        *mount = Some(Mount {
            root: self.root.clone(),
            next_id,
        });
        Ok(())
    }

    /// Unmount the storage root. Later operations fail with `NotOpen` until
    /// the store is opened again.
    pub fn close(&self) {
        if self.lock().take().is_some() {
            info!("Record store at {} unmounted", self.root.display());
        }
    }

    /// Whether the store is mounted and usable
    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Id the next [`save`](Self::save) will use, if the store is open
    pub fn next_id(&self) -> Option<RecordId> {
        self.lock().as_ref().map(|mount| RecordId(mount.next_id))
    }

    /// Count retained records without reading them.
    ///
    /// # Errors
    ///
    /// Returns `NotOpen`, `DirectoryOpenFailed` or `DirectoryCloseFailed`.
    /// None of them change the store's state.
    pub fn peek_count(&self) -> Result<usize, StoreError> {
        let mount = self.lock();
        let mount = mount.as_ref().ok_or(StoreError::NotOpen)?;

        let count = scan(&mount.root)?.len();
        debug!("Found {} record(s) in {}", count, mount.root.display());
        Ok(count)
    }

    /// List up to `limit` retained ids in ascending order.
    ///
    /// Files whose names do not match the record pattern are skipped.
    pub fn list_ids(&self, limit: usize) -> Result<Vec<RecordId>, StoreError> {
        let mount = self.lock();
        let mount = mount.as_ref().ok_or(StoreError::NotOpen)?;

        let ids: Vec<RecordId> = scan(&mount.root)?
            .into_iter()
            .take(limit)
            .map(|(id, _)| id)
            .collect();
        debug!("Listed {} of at most {} record id(s)", ids.len(), limit);
        Ok(ids)
    }

    /// Write `record` under the next sequence id, then advance the counter.
    ///
    /// # Returns
    ///
    /// * `Result<RecordId, StoreError>` - Id the record was stored under
    ///
    /// # Errors
    ///
    /// Returns `FileOpenForWriteFailed` if the file cannot be created or
    /// written; the counter is left unchanged and no partial file remains.
    pub fn save(&self, record: &TelemetryRecord) -> Result<RecordId, StoreError> {
        let mut mount = self.lock();
        let mount = mount.as_mut().ok_or(StoreError::NotOpen)?;

        let id = RecordId(mount.next_id);
        let path = mount.root.join(id.file_name());
        debug!("Writing record {} to {}", id, path.display());

        write_record(&path, record).map_err(|source| {
            error!("Failed to write {}: {}", path.display(), source);
            StoreError::FileOpenForWriteFailed {
                path: path.clone(),
                source,
            }
        })?;

        mount.next_id = self.advance(mount.next_id);
        info!("Saved record {}", id);
        Ok(id)
    }

    /// Read the records stored under `ids`.
    ///
    /// Missing ids and files that cannot be read in full are logged and
    /// skipped; compare [`ReadBatch::count`] against the request size.
    ///
    /// # Errors
    ///
    /// Returns `NotOpen` or a directory error. Per-file failures never fail
    /// the batch.
    pub fn read_batch(&self, ids: &BTreeSet<RecordId>) -> Result<ReadBatch, StoreError> {
        let mount = self.lock();
        let mount = mount.as_ref().ok_or(StoreError::NotOpen)?;

        let mut batch = ReadBatch {
            records: Vec::with_capacity(ids.len()),
            requested: ids.len(),
        };

        for (id, path) in scan(&mount.root)? {
            if !ids.contains(&id) {
                continue;
            }

            match read_record(&path) {
                Ok(record) => batch.records.push((id, record)),
                Err(source) => {
                    let err = StoreError::FileOpenForReadFailed { path, source };
                    error!("Skipping record {}: {}", id, err);
                }
            }
        }

        if batch.is_partial() {
            warn!(
                "Expected to read {} record(s), but found and read {}",
                batch.requested,
                batch.count()
            );
        } else {
            debug!("Read {} record(s)", batch.count());
        }
        Ok(batch)
    }

    /// Delete the records stored under `ids`.
    ///
    /// # Returns
    ///
    /// * `Result<usize, StoreError>` - Number of files actually removed.
    ///   Absent ids and failed removals are logged and not counted.
    pub fn delete_batch(&self, ids: &BTreeSet<RecordId>) -> Result<usize, StoreError> {
        let mount = self.lock();
        let mount = mount.as_ref().ok_or(StoreError::NotOpen)?;

        let mut deleted = 0;
        for (id, path) in scan(&mount.root)? {
            if !ids.contains(&id) {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Deleted {}", path.display());
                    deleted += 1;
                }
                Err(e) => error!("Failed to delete {}: {}", path.display(), e),
            }
        }

        if deleted < ids.len() {
            warn!(
                "Expected to delete {} record(s), but found and deleted {}",
                ids.len(),
                deleted
            );
        } else {
            info!("Deleted {} record(s)", deleted);
        }
        Ok(deleted)
    }

    fn advance(&self, id: u32) -> u32 {
        match id.checked_add(1) {
            Some(next) if next < self.max_sequence_id => next,
            _ => 0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Mount>> {
        self.mount.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Walk the root and collect record files in ascending id order
fn scan(root: &Path) -> Result<Vec<(RecordId, PathBuf)>, StoreError> {
    let entries = fs::read_dir(root).map_err(|source| {
        error!("Failure opening directory {}: {}", root.display(), source);
        StoreError::DirectoryOpenFailed {
            path: root.to_path_buf(),
            source,
        }
    })?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| {
            error!("Failure walking directory {}: {}", root.display(), source);
            StoreError::DirectoryCloseFailed {
                path: root.to_path_buf(),
                source,
            }
        })?;

        let name = entry.file_name();
        match name.to_str().and_then(RecordId::parse_file_name) {
            Some(id) => found.push((id, entry.path())),
            None => warn!("File name format not supported: {:?}", name),
        }
    }

    found.sort_unstable_by_key(|(id, _)| *id);
    Ok(found)
}

fn write_record(path: &Path, record: &TelemetryRecord) -> io::Result<()> {
    let mut file = File::create(path)?;
    let written = file
        .write_all(&encode_record(record))
        .and_then(|()| file.sync_all());

    if let Err(e) = written {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

fn read_record(path: &Path) -> io::Result<TelemetryRecord> {
    let mut buf = Vec::with_capacity(RECORD_SIZE);
    File::open(path)?.read_to_end(&mut buf)?;
    if buf.len() != RECORD_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("record file is {} bytes, expected {}", buf.len(), RECORD_SIZE),
        ));
    }
    decode_record(&buf)
}
