// 1. Local crate imports
use super::{WalRecord, MAX_PAYLOAD_SIZE};
use basalt_core::{Error, Result};

// 2. External crate imports
use log::warn;

// 3. Standard library imports
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Outcome of a replay pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records whose checksums validated and that were applied
    pub applied: u64,
    /// Whether replay stopped at a truncated or corrupt tail record
    pub truncated: bool,
}

/// Reader for the Write-Ahead Log
///
/// Reads records sequentially from the start of the file, verifying each
/// checksum. A truncated or corrupt record terminates reading: that is
/// the normal signature of a crash mid-append, so [`WalReader::replay`]
/// treats it as the end of the committed log rather than an error.
///
/// # Example
///
/// ```no_run
/// use basalt_storage::wal::WalReader;
///
/// let mut reader = WalReader::new("data/wal.log")?;
/// let stats = reader.replay(|record| {
///     // apply the mutation to the in-memory store
///     let _ = record.key();
/// })?;
/// if stats.truncated {
///     eprintln!("discarded crash tail after {} records", stats.applied);
/// }
/// # Ok::<(), basalt_core::Error>(())
/// ```
pub struct WalReader {
    reader: BufReader<File>,
    path: PathBuf,
}

impl WalReader {
    /// Opens a WAL file for sequential reading
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self {
            reader: BufReader::new(file),
            path,
        })
    }

    /// Reads the next record
    ///
    /// Returns `Ok(None)` at a clean end of file *or* when the final
    /// record is truncated mid-write (the crash tail). A record whose
    /// checksum or framing is invalid returns `Error::Corruption`.
    pub fn read_record(&mut self) -> Result<Option<WalRecord>> {
        let mut header = [0u8; 8];
        match read_exact_or_eof(&mut self.reader, &mut header)? {
            ReadOutcome::Complete => {}
            ReadOutcome::CleanEof => return Ok(None),
            ReadOutcome::TruncatedTail => {
                warn!("WAL {:?}: truncated record header at tail", self.path);
                return Ok(None);
            }
        }

        let length = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
        let checksum = u32::from_le_bytes(header[4..8].try_into().unwrap());

        if length > MAX_PAYLOAD_SIZE {
            return Err(Error::Corruption(format!(
                "WAL payload size {} exceeds maximum {}",
                length, MAX_PAYLOAD_SIZE
            )));
        }

        let mut payload = vec![0u8; length];
        match read_exact_or_eof(&mut self.reader, &mut payload)? {
            ReadOutcome::Complete => {}
            ReadOutcome::CleanEof | ReadOutcome::TruncatedTail => {
                warn!("WAL {:?}: truncated record payload at tail", self.path);
                return Ok(None);
            }
        }

        WalRecord::decode_payload(&payload, checksum).map(Some)
    }

    /// Replays the committed prefix of the log
    ///
    /// Applies every record whose framing and checksum validate, in
    /// append order. Replay halts cleanly at the first corrupt record and
    /// reports it through [`ReplayStats::truncated`]; only I/O failures
    /// while reading surface as errors.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<ReplayStats>
    where
        F: FnMut(WalRecord),
    {
        let mut stats = ReplayStats::default();
        loop {
            match self.read_record() {
                Ok(Some(record)) => {
                    apply(record);
                    stats.applied += 1;
                }
                Ok(None) => break,
                Err(Error::Corruption(msg)) => {
                    warn!(
                        "WAL {:?}: replay stopped at corrupt record after {} applied: {}",
                        self.path, stats.applied, msg
                    );
                    stats.truncated = true;
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(stats)
    }

    /// Reads all committed records into memory
    pub fn read_all(&mut self) -> Result<Vec<WalRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.read_record()? {
            records.push(record);
        }
        Ok(records)
    }
}

impl Iterator for WalReader {
    type Item = Result<WalRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

enum ReadOutcome {
    Complete,
    CleanEof,
    TruncatedTail,
}

/// Fills `buf`, distinguishing a clean EOF (no bytes read) from a
/// truncated tail (some bytes read, then EOF)
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> Result<ReadOutcome> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Ok(if filled == 0 {
                    ReadOutcome::CleanEof
                } else {
                    ReadOutcome::TruncatedTail
                });
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(ReadOutcome::Complete)
}
