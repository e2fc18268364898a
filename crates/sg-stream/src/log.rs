use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, StreamError};
use crate::event::{Fields, MessageId};

/// One record of the stream log.
///
/// On-disk framing:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized LogRecord)]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRecord {
    /// A message was published.
    Append { id: MessageId, fields: Fields },
    /// A message was acknowledged.
    Ack { id: MessageId },
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

struct LogWriter {
    writer: BufWriter<File>,
    offset: u64,
}

/// Crash-recoverable append-only record log.
///
/// Recovery reads front to back. A record whose CRC does not match is
/// skipped; a torn tail (short header or payload) ends recovery.
pub struct StreamLog {
    path: PathBuf,
    writer: Mutex<LogWriter>,
    sync_every_write: bool,
}

fn encode(record: &LogRecord) -> Result<Vec<u8>> {
    let payload =
        bincode::serialize(record).map_err(|e| StreamError::Serialization(e.to_string()))?;
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

impl StreamLog {
    /// Open (or create) the log file at `path`.
    pub fn open(path: &Path, sync_every_write: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(LogWriter {
                writer: BufWriter::new(file),
                offset,
            }),
            sync_every_write,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, LogWriter>> {
        self.writer
            .lock()
            .map_err(|e| StreamError::Unavailable(format!("log lock poisoned: {e}")))
    }

    /// Append a record. Returns the byte offset it was written at.
    pub fn append(&self, record: &LogRecord) -> Result<u64> {
        let frame = encode(record)?;
        let mut w = self.lock()?;
        let at = w.offset;

        w.writer.write_all(&frame)?;
        w.writer.flush()?;
        if self.sync_every_write {
            w.writer.get_ref().sync_all()?;
        }
        w.offset += frame.len() as u64;

        debug!(offset = at, len = frame.len(), "log append");
        Ok(at)
    }

    /// Read back every intact record.
    pub fn recover(&self) -> Result<Vec<LogRecord>> {
        let file = File::open(&self.path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let mut header = [0u8; HEADER_SIZE];
            match reader.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            if length == 0 {
                warn!(offset, "zero-length log record; stopping recovery");
                break;
            }
            if offset + HEADER_SIZE as u64 + u64::from(length) > file_len {
                warn!(offset, length, file_len, "log record runs past end of file; stopping recovery");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!(offset, length, "truncated log record; stopping recovery");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
            offset += HEADER_SIZE as u64 + u64::from(length);

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch; skipping record"
                );
                continue;
            }
            match bincode::deserialize::<LogRecord>(&payload) {
                Ok(record) => records.push(record),
                Err(e) => warn!(offset, error = %e, "undecodable log record; skipping"),
            }
        }

        debug!(recovered = records.len(), "log recovery complete");
        Ok(records)
    }

    /// Replace the log's contents with `records`.
    ///
    /// The new contents are written to a sibling file and renamed over the
    /// log, so a crash leaves either the old or the new log in place.
    pub fn rewrite(&self, records: &[LogRecord]) -> Result<()> {
        let mut w = self.lock()?;
        let tmp = self.path.with_extension("compact");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            for record in records {
                out.write_all(&encode(record)?)?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        w.offset = file.metadata()?.len();
        w.writer = BufWriter::new(file);

        debug!(records = records.len(), bytes = w.offset, "log rewritten");
        Ok(())
    }

    /// Current end-of-log offset.
    pub fn offset(&self) -> u64 {
        self.lock().map(|w| w.offset).unwrap_or(0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
