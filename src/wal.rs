use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Encode a single event to [len][bincode][crc32] format. Returns the bytes written.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<u64> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(8 + payload.len() as u64)
}

/// `Ok(None)` on clean EOF or a torn tail.
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<Option<()>> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(Some(())),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

/// Decode the next entry and its encoded size.
/// `Ok(None)` means stop: end of file, truncation or corruption.
fn decode_event(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut len_buf = [0u8; 4];
    if read_exact_or_eof(reader, &mut len_buf)?.is_none() {
        return Ok(None);
    }
    let mut payload = vec![0u8; u32::from_le_bytes(len_buf) as usize];
    if read_exact_or_eof(reader, &mut payload)?.is_none() {
        return Ok(None);
    }
    let mut crc_buf = [0u8; 4];
    if read_exact_or_eof(reader, &mut crc_buf)?.is_none() {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize::<Event>(&payload)
        .ok()
        .map(|event| (event, 8 + payload.len() as u64)))
}

/// Every valid event and the byte length of the valid prefix.
fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    let mut events = Vec::new();
    let mut valid_len = 0;
    while let Some((event, size)) = decode_event(&mut reader)? {
        events.push(event);
        valid_len += size;
    }
    Ok((events, valid_len))
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Append-only Write-Ahead Log of unit and reservation events.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - A torn last entry (crash mid-write) is discarded via length-prefix + CRC check,
///   and cut off when the log is reopened so later appends stay reachable.
///
/// The file never holds bytes past `committed_len` once a batch has failed:
/// `discard_uncommitted` truncates them and drops whatever is still buffered.
/// If that cleanup fails too the log is poisoned and refuses further writes
/// until a compaction rewrites it.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
    committed_len: u64,
    pending_len: u64,
    pending_appends: u64,
    poisoned: bool,
}

impl Wal {
    /// Open (or create) the WAL file at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::recover(path)?.0)
    }

    /// Open the WAL and return its valid events. A torn or corrupt tail is truncated.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let (events, valid_len) = scan(path)?;
        let file = open_append(path)?;
        let file_len = file.metadata()?.len();
        if file_len > valid_len {
            tracing::warn!(
                "truncating {} bytes of torn WAL tail in {}",
                file_len - valid_len,
                path.display()
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        let wal = Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
            committed_len: valid_len,
            pending_len: 0,
            pending_appends: 0,
            poisoned: false,
        };
        Ok((wal, events))
    }

    fn check_writable(&self) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::other("WAL poisoned by an earlier failed write"));
        }
        Ok(())
    }

    /// Append a single event to the BufWriter without flushing or syncing.
    /// Call `flush_sync()` after the batch to durably commit all buffered events.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        self.check_writable()?;
        self.pending_len += encode_event(&mut self.writer, event)?;
        self.pending_appends += 1;
        Ok(())
    }

    /// Flush the BufWriter and fsync the underlying file.
    /// On error the batch is not committed; call `discard_uncommitted()`.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.check_writable()?;
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.committed_len += self.pending_len;
        self.appends_since_compact += self.pending_appends;
        self.pending_len = 0;
        self.pending_appends = 0;
        Ok(())
    }

    /// Throw away everything since the last successful `flush_sync`: bytes
    /// still in the buffer and any partial write that already reached the file.
    pub fn discard_uncommitted(&mut self) -> io::Result<()> {
        self.pending_len = 0;
        self.pending_appends = 0;
        let result = open_append(&self.path).and_then(|file| {
            file.set_len(self.committed_len)?;
            file.sync_all()?;
            Ok(file)
        });
        match result {
            Ok(file) => {
                // into_parts hands back the buffer instead of flushing it on drop.
                let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
                let _ = stale.into_parts();
                Ok(())
            }
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compact_tmp_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write compacted events to a temp file next to the WAL and fsync.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let file = File::create(Self::compact_tmp_path(path))?;
        let mut writer = BufWriter::new(file);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Atomic swap: rename the temp file over the WAL and reopen. Clears poisoning,
    /// since the rewritten file holds exactly the applied state.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::compact_tmp_path(&self.path), &self.path)?;
        let file = open_append(&self.path)?;
        let committed_len = file.metadata()?.len();
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        let _ = stale.into_parts();
        self.committed_len = committed_len;
        self.pending_len = 0;
        self.pending_appends = 0;
        self.appends_since_compact = 0;
        self.poisoned = false;
        Ok(())
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replay the WAL from disk, returning all valid events.
    /// Replay stops silently at the first truncated or corrupt entry.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        Ok(scan(path)?.0)
    }
}
