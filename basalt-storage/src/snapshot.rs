//! Atomic full-state snapshots
//!
//! A snapshot is a newline-delimited JSON dump of every `(key, value)`
//! pair in the store, with the byte strings base64-encoded so binary
//! values round-trip losslessly. Writing is atomic: the records go to
//! `snapshot.json.tmp`, the file is fsynced, renamed over
//! `snapshot.json`, and the parent directory is fsynced — a loader can
//! never observe a partially written snapshot.
//!
//! After a snapshot lands, the WAL it supersedes is truncated by the
//! durability manager.

use basalt_core::{Error, Key, Result, Value};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// File name of the current snapshot inside the data directory
pub const SNAPSHOT_FILE: &str = "snapshot.json";
/// Transient file used while a snapshot is being written
pub const SNAPSHOT_TMP_FILE: &str = "snapshot.json.tmp";

#[derive(Serialize, Deserialize)]
struct SnapshotRecord {
    #[serde(with = "base64_bytes")]
    key: Key,
    #[serde(with = "base64_bytes")]
    value: Value,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Writes and loads point-in-time dumps of the in-memory store
pub struct SnapshotEngine {
    dir: PathBuf,
}

impl SnapshotEngine {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    fn tmp_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_TMP_FILE)
    }

    /// Whether a snapshot currently exists
    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Removes a temp file left behind by a crash mid-snapshot
    ///
    /// Called once at open. The previous complete snapshot (if any) is
    /// untouched; the interrupted attempt is simply discarded.
    pub fn remove_stale_tmp(&self) -> Result<()> {
        let tmp = self.tmp_path();
        if tmp.exists() {
            warn!("removing stale snapshot temp file {:?}", tmp);
            fs::remove_file(&tmp)?;
        }
        Ok(())
    }

    /// Atomically writes a snapshot of all the given pairs
    ///
    /// Returns the number of records written. On success the previous
    /// snapshot has been replaced; on error the previous snapshot is
    /// intact and the temp file may remain (cleaned at next open).
    pub fn save<I>(&self, entries: I) -> Result<u64>
    where
        I: IntoIterator<Item = (Key, Value)>,
    {
        let tmp = self.tmp_path();
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);

        let mut count = 0u64;
        for (key, value) in entries {
            let record = SnapshotRecord { key, value };
            serde_json::to_writer(&mut writer, &record)
                .map_err(|err| Error::IoPermanent(format!("snapshot encoding failed: {}", err)))?;
            writer.write_all(b"\n")?;
            count += 1;
        }

        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);

        fs::rename(&tmp, self.path())?;
        self.sync_dir()?;

        info!("snapshot written: {} records at {:?}", count, self.path());
        Ok(count)
    }

    /// Loads the current snapshot, if any
    ///
    /// A missing snapshot is a fresh database, not an error; it yields an
    /// empty list.
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` when a record fails to parse — the
    /// atomic rename means a snapshot is either complete or absent, so a
    /// malformed record indicates real damage rather than a crash tail.
    pub fn load(&self) -> Result<Vec<(Key, Value)>> {
        let path = self.path();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let record: SnapshotRecord = serde_json::from_str(&line).map_err(|err| {
                Error::Corruption(format!(
                    "snapshot record {} is malformed: {}",
                    line_no + 1,
                    err
                ))
            })?;
            entries.push((record.key, record.value));
        }
        Ok(entries)
    }

    // Persist the rename itself; without this a crash can roll back the
    // directory entry even though the data blocks are on disk.
    fn sync_dir(&self) -> Result<()> {
        #[cfg(unix)]
        {
            File::open(&self.dir)?.sync_all()?;
        }
        Ok(())
    }
}
