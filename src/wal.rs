//! Append-only reservation log.
//!
//! Record layout: `[u32 le payload len][bincode Event][u32 le crc32(payload)]`.
//! A batch is encoded in memory and reaches the file as one write followed by
//! one fsync. When that fails the file is cut back to its last synced length,
//! so an event reported as failed never shows up on a later replay.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::Event;

const LEN_BYTES: usize = 4;
const CRC_BYTES: usize = 4;

/// Largest payload replay will allocate for. Real events are a few hundred
/// bytes; anything bigger is a damaged length prefix.
const MAX_PAYLOAD: usize = 1 << 20;

pub struct Wal {
    file: File,
    path: PathBuf,
    /// Bytes covered by a successful fsync. Nothing past this is trusted.
    synced_len: u64,
    /// A rollback failed, so the tail may hold bytes we reported as lost.
    poisoned: bool,
}

impl Wal {
    /// Open (or create) the log at `path` and return the events it holds.
    ///
    /// A torn or corrupt tail is cut off first, so new records always follow
    /// the last good one and stay reachable on the next replay.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let (events, valid_len) = scan(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        let on_disk = file.metadata()?.len();
        if on_disk > valid_len {
            warn!(
                path = %path.display(),
                discarded_bytes = on_disk - valid_len,
                "cutting damaged tail off reservation log"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        let wal = Self {
            file,
            path: path.to_path_buf(),
            synced_len: valid_len,
            poisoned: false,
        };
        Ok((wal, events))
    }

    /// Durably append `events`. Either every one of them survives a restart
    /// or none does.
    pub fn append_batch(&mut self, events: &[Event]) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::other("reservation log unusable after failed rollback"));
        }

        let mut buf = Vec::new();
        for event in events {
            encode(&mut buf, event)?;
        }

        match self.write_synced(&buf) {
            Ok(()) => {
                self.synced_len += buf.len() as u64;
                Ok(())
            }
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    fn write_synced(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)?;
        self.file.sync_data()
    }

    /// Drop whatever a failed batch left behind.
    fn rollback(&mut self) {
        let result = self
            .file
            .set_len(self.synced_len)
            .and_then(|()| self.file.sync_all());
        if let Err(e) = result {
            warn!(
                path = %self.path.display(),
                error = %e,
                "reservation log rollback failed; refusing further appends"
            );
            self.poisoned = true;
        }
    }
}

fn encode(buf: &mut Vec<u8>, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&payload);
    buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(())
}

/// Read every intact record. Also returns the byte length they cover, which
/// is where the next record belongs.
fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    let mut events = Vec::new();
    let mut valid_len = 0u64;

    while let Some((event, record_len)) = read_record(&mut reader)? {
        events.push(event);
        valid_len += record_len as u64;
    }
    Ok((events, valid_len))
}

/// `Ok(None)` marks the end of the usable log: clean EOF, a torn record,
/// or one that fails its checksum.
fn read_record(reader: &mut impl Read) -> io::Result<Option<(Event, usize)>> {
    let mut len_buf = [0u8; LEN_BYTES];
    if !read_full(reader, &mut len_buf)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_PAYLOAD {
        return Ok(None);
    }

    let mut payload = vec![0u8; len];
    let mut crc_buf = [0u8; CRC_BYTES];
    if !read_full(reader, &mut payload)? || !read_full(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }

    Ok(bincode::deserialize(&payload)
        .ok()
        .map(|event| (event, LEN_BYTES + len + CRC_BYTES)))
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}
