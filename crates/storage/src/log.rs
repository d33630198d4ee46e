//! Persistent append-only log backend.
//!
//! Data lives in numbered segment files; an in-memory ordered index maps
//! each live key to the file location of its latest value. Opening a store
//! replays every segment in order to rebuild the index.
//!
//! # Segment layout
//!
//! Segments are named `log-NNNNNN.seg`.
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │ Header (16 bytes)                │  magic, format version, segment no.
//! ├──────────────────────────────────┤
//! │ Record 1                         │
//! ├──────────────────────────────────┤
//! │ ...                              │
//! └──────────────────────────────────┘
//! ```
//!
//! # Record layout
//!
//! ```text
//! ┌────────────┬─────────────────────────────────────────┬──────────┐
//! │ Length (4) │ Payload                                 │ CRC32 (4)│
//! └────────────┴─────────────────────────────────────────┴──────────┘
//!
//! Payload:
//! ┌────────┬──────────┬──────────┬───────────┬─────────────┐
//! │ Op (1) │ KLen (4) │ VLen (4) │ Key       │ Value       │
//! └────────┴──────────┴──────────┴───────────┴─────────────┘
//! ```
//!
//! All integers are little-endian. The CRC covers the payload. A torn or
//! corrupt record ends replay of its segment: every fully-written record
//! before it survives, everything after it is dropped.

use crate::backend::Backend;
use crate::comparator::{KeyComparator, OrderedKey};
use crate::fileset::Fileset;
use byteorder::{ByteOrder, LittleEndian};
use keyfab_core::{BackendKind, DatabaseConfig, Error, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Magic bytes identifying a log segment file.
pub const SEGMENT_MAGIC: [u8; 4] = *b"KFLG";

/// Current segment format version.
pub const SEGMENT_FORMAT_VERSION: u32 = 1;

/// Size of the segment header in bytes.
pub const SEGMENT_HEADER_SIZE: usize = 16;

/// Active segments rotate once they grow past this many bytes.
const SEGMENT_ROTATE_BYTES: u64 = 64 * 1024 * 1024;

/// Upper bound on a single record's payload; larger length fields are
/// treated as corruption during replay.
const MAX_RECORD_PAYLOAD: u32 = 256 * 1024 * 1024;

const OP_PUT: u8 = 1;
const OP_ERASE: u8 = 2;

/// Where the latest value of a key lives on disk.
#[derive(Debug, Clone, Copy)]
struct ValueLoc {
    segment: u64,
    /// Byte offset of the value within the segment file
    offset: u64,
    len: u32,
}

struct ActiveSegment {
    file: File,
    number: u64,
    size: u64,
}

struct Inner {
    index: BTreeMap<OrderedKey, ValueLoc>,
    active: ActiveSegment,
    first_segment: u64,
}

/// The append-only log backend.
pub struct LogStore {
    name: String,
    dir: PathBuf,
    no_overwrite: bool,
    order: Arc<KeyComparator>,
    inner: RwLock<Inner>,
}

fn segment_path(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("log-{:06}.seg", number))
}

fn segment_file_name(number: u64) -> PathBuf {
    PathBuf::from(format!("log-{:06}.seg", number))
}

fn encode_header(number: u64) -> [u8; SEGMENT_HEADER_SIZE] {
    let mut header = [0u8; SEGMENT_HEADER_SIZE];
    header[0..4].copy_from_slice(&SEGMENT_MAGIC);
    LittleEndian::write_u32(&mut header[4..8], SEGMENT_FORMAT_VERSION);
    LittleEndian::write_u64(&mut header[8..16], number);
    header
}

fn encode_record(op: u8, key: &[u8], value: &[u8]) -> Vec<u8> {
    let payload_len = 1 + 4 + 4 + key.len() + value.len();
    let mut record = Vec::with_capacity(4 + payload_len + 4);
    let mut scratch = [0u8; 4];
    LittleEndian::write_u32(&mut scratch, payload_len as u32);
    record.extend_from_slice(&scratch);
    record.push(op);
    LittleEndian::write_u32(&mut scratch, key.len() as u32);
    record.extend_from_slice(&scratch);
    LittleEndian::write_u32(&mut scratch, value.len() as u32);
    record.extend_from_slice(&scratch);
    record.extend_from_slice(key);
    record.extend_from_slice(value);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&record[4..]);
    LittleEndian::write_u32(&mut scratch, hasher.finalize());
    record.extend_from_slice(&scratch);
    record
}

/// Byte offset of the value within a record, measured from the record's
/// start, given the key length.
fn value_offset_in_record(key_len: usize) -> u64 {
    (4 + 1 + 4 + 4 + key_len) as u64
}

impl LogStore {
    /// Open or create a log store rooted at the configured directory.
    ///
    /// Existing segments are replayed in order to rebuild the index.
    pub fn open(config: &DatabaseConfig, comparator: KeyComparator) -> Result<Self> {
        if config.path.as_os_str().is_empty() {
            return Err(Error::DbCreate(format!(
                "log store {:?} requires a storage path",
                config.name
            )));
        }
        std::fs::create_dir_all(&config.path)
            .map_err(|e| Error::DbCreate(format!("{}: {}", config.path.display(), e)))?;

        let order = Arc::new(comparator);
        let mut numbers = Self::scan_segments(&config.path)
            .map_err(|e| Error::DbCreate(format!("{}: {}", config.path.display(), e)))?;
        numbers.sort_unstable();

        let mut index = BTreeMap::new();
        for &number in &numbers {
            Self::replay_segment(&config.path, number, &order, &mut index)
                .map_err(|e| Error::DbCreate(format!("replay of segment {}: {}", number, e)))?;
        }

        let (first, active_number) = match (numbers.first(), numbers.last()) {
            (Some(&first), Some(&last)) => (first, last),
            _ => (1, 1),
        };
        let active = if numbers.is_empty() {
            Self::create_segment(&config.path, active_number)
                .map_err(|e| Error::DbCreate(e.to_string()))?
        } else {
            Self::open_append(&config.path, active_number)
                .map_err(|e| Error::DbCreate(e.to_string()))?
        };

        Ok(LogStore {
            name: config.name.clone(),
            dir: config.path.clone(),
            no_overwrite: config.no_overwrite,
            order,
            inner: RwLock::new(Inner {
                index,
                active,
                first_segment: first,
            }),
        })
    }

    fn scan_segments(dir: &Path) -> Result<Vec<u64>> {
        let mut numbers = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_prefix("log-").and_then(|s| s.strip_suffix(".seg")) {
                if let Ok(number) = stem.parse::<u64>() {
                    numbers.push(number);
                }
            }
        }
        Ok(numbers)
    }

    fn create_segment(dir: &Path, number: u64) -> std::io::Result<ActiveSegment> {
        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(segment_path(dir, number))?;
        file.write_all(&encode_header(number))?;
        Ok(ActiveSegment {
            file,
            number,
            size: SEGMENT_HEADER_SIZE as u64,
        })
    }

    fn open_append(dir: &Path, number: u64) -> std::io::Result<ActiveSegment> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(segment_path(dir, number))?;
        let size = file.seek(SeekFrom::End(0))?;
        Ok(ActiveSegment { file, number, size })
    }

    /// Replay one segment into `index`. Stops quietly at the first torn or
    /// corrupt record.
    fn replay_segment(
        dir: &Path,
        number: u64,
        order: &Arc<KeyComparator>,
        index: &mut BTreeMap<OrderedKey, ValueLoc>,
    ) -> Result<()> {
        let mut file = File::open(segment_path(dir, number))?;
        let mut header = [0u8; SEGMENT_HEADER_SIZE];
        file.read_exact(&mut header)?;
        if header[0..4] != SEGMENT_MAGIC {
            return Err(Error::DbCreate(format!(
                "segment {} has bad magic bytes",
                number
            )));
        }
        let stored_number = LittleEndian::read_u64(&header[8..16]);
        if stored_number != number {
            return Err(Error::DbCreate(format!(
                "segment {} header claims number {}",
                number, stored_number
            )));
        }

        let mut offset = SEGMENT_HEADER_SIZE as u64;
        let mut len_bytes = [0u8; 4];
        loop {
            match file.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(_) => break, // clean end or torn length field
            }
            let payload_len = LittleEndian::read_u32(&len_bytes);
            if payload_len < 9 || payload_len > MAX_RECORD_PAYLOAD {
                warn!(segment = number, offset, "dropping corrupt record length");
                break;
            }
            let mut payload = vec![0u8; payload_len as usize];
            if file.read_exact(&mut payload).is_err() {
                warn!(segment = number, offset, "dropping torn record");
                break;
            }
            let mut crc_bytes = [0u8; 4];
            if file.read_exact(&mut crc_bytes).is_err() {
                warn!(segment = number, offset, "dropping record with torn checksum");
                break;
            }
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(&payload);
            if hasher.finalize() != LittleEndian::read_u32(&crc_bytes) {
                warn!(segment = number, offset, "dropping record with bad checksum");
                break;
            }

            let op = payload[0];
            let key_len = LittleEndian::read_u32(&payload[1..5]) as usize;
            let val_len = LittleEndian::read_u32(&payload[5..9]) as usize;
            if 9 + key_len + val_len != payload.len() {
                warn!(segment = number, offset, "dropping record with bad lengths");
                break;
            }
            let key = payload[9..9 + key_len].to_vec();
            let ordered = OrderedKey::new(key, order.clone());
            match op {
                OP_PUT => {
                    index.insert(
                        ordered,
                        ValueLoc {
                            segment: number,
                            offset: offset + value_offset_in_record(key_len),
                            len: val_len as u32,
                        },
                    );
                }
                OP_ERASE => {
                    index.remove(&ordered);
                }
                _ => {
                    warn!(segment = number, offset, op, "dropping record with unknown op");
                    break;
                }
            }
            offset += 4 + payload_len as u64 + 4;
        }
        Ok(())
    }

    fn append(inner: &mut Inner, dir: &Path, op: u8, key: &[u8], value: &[u8]) -> Result<u64> {
        if inner.active.size >= SEGMENT_ROTATE_BYTES {
            let next = inner.active.number + 1;
            inner.active = Self::create_segment(dir, next)?;
        }
        let record = encode_record(op, key, value);
        let record_offset = inner.active.size;
        inner.active.file.write_all(&record)?;
        inner.active.size += record.len() as u64;
        Ok(record_offset)
    }

    fn read_value(&self, loc: ValueLoc) -> Result<Vec<u8>> {
        let mut file = File::open(segment_path(&self.dir, loc.segment))?;
        file.seek(SeekFrom::Start(loc.offset))?;
        let mut value = vec![0u8; loc.len as usize];
        file.read_exact(&mut value)?;
        Ok(value)
    }

    fn wrap(&self, key: &[u8]) -> OrderedKey {
        OrderedKey::new(key.to_vec(), self.order.clone())
    }

    fn start_bound(&self, start: &[u8]) -> Bound<OrderedKey> {
        if start.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(self.wrap(start))
        }
    }
}

impl Backend for LogStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::LogStore
    }

    fn path(&self) -> &Path {
        &self.dir
    }

    fn comparator_name(&self) -> Option<&str> {
        self.order.name()
    }

    fn no_overwrite(&self) -> bool {
        self.no_overwrite
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut inner = self.inner.write();
        let ordered = self.wrap(key);
        if self.no_overwrite && inner.index.contains_key(&ordered) {
            return Err(Error::KeyExists);
        }
        let record_offset = Self::append(&mut inner, &self.dir, OP_PUT, key, value)
            .map_err(|e| Error::Put(e.to_string()))?;
        let loc = ValueLoc {
            segment: inner.active.number,
            offset: record_offset + value_offset_in_record(key.len()),
            len: value.len() as u32,
        };
        inner.index.insert(ordered, loc);
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let loc = {
            let inner = self.inner.read();
            match inner.index.get(&self.wrap(key)) {
                Some(loc) => *loc,
                None => return Err(Error::UnknownKey),
            }
        };
        self.read_value(loc)
    }

    fn length(&self, key: &[u8]) -> Result<u64> {
        let inner = self.inner.read();
        match inner.index.get(&self.wrap(key)) {
            Some(loc) => Ok(loc.len as u64),
            None => Err(Error::UnknownKey),
        }
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.inner.read().index.contains_key(&self.wrap(key)))
    }

    fn erase(&self, key: &[u8]) -> Result<()> {
        let mut inner = self.inner.write();
        let ordered = self.wrap(key);
        if !inner.index.contains_key(&ordered) {
            return Err(Error::Erase);
        }
        Self::append(&mut inner, &self.dir, OP_ERASE, key, b"")?;
        inner.index.remove(&ordered);
        Ok(())
    }

    fn list_keys(&self, start: &[u8], prefix: &[u8], max: usize) -> Result<Vec<Vec<u8>>> {
        let inner = self.inner.read();
        let mut keys = Vec::new();
        for (key, _) in inner.index.range((self.start_bound(start), Bound::Unbounded)) {
            if keys.len() >= max {
                break;
            }
            if key.bytes().starts_with(prefix) {
                keys.push(key.bytes().to_vec());
            }
        }
        Ok(keys)
    }

    fn list_keyvals(
        &self,
        start: &[u8],
        prefix: &[u8],
        max: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let located: Vec<(Vec<u8>, ValueLoc)> = {
            let inner = self.inner.read();
            let mut located = Vec::new();
            for (key, loc) in inner.index.range((self.start_bound(start), Bound::Unbounded)) {
                if located.len() >= max {
                    break;
                }
                if key.bytes().starts_with(prefix) {
                    located.push((key.bytes().to_vec(), *loc));
                }
            }
            located
        };
        let mut pairs = Vec::with_capacity(located.len());
        for (key, loc) in located {
            let value = self.read_value(loc)?;
            pairs.push((key, value));
        }
        Ok(pairs)
    }

    fn list_range(
        &self,
        lower: &[u8],
        upper: &[u8],
        max: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        // An empty or inverted interval has nothing in it (and would panic
        // the tree's range check).
        if self.order.compare(lower, upper) != std::cmp::Ordering::Less {
            return Ok(Vec::new());
        }
        let located: Vec<(Vec<u8>, ValueLoc)> = {
            let inner = self.inner.read();
            let bounds = (
                Bound::Excluded(self.wrap(lower)),
                Bound::Excluded(self.wrap(upper)),
            );
            let mut located = Vec::new();
            for (key, loc) in inner.index.range(bounds) {
                if max != 0 && located.len() >= max {
                    break;
                }
                located.push((key.bytes().to_vec(), *loc));
            }
            located
        };
        let mut pairs = Vec::with_capacity(located.len());
        for (key, loc) in located {
            let value = self.read_value(loc)?;
            pairs.push((key, value));
        }
        Ok(pairs)
    }

    fn sync(&self) -> Result<()> {
        let inner = self.inner.read();
        inner.active.file.sync_all()?;
        Ok(())
    }

    fn create_fileset(&self) -> Result<Option<Fileset>> {
        let inner = self.inner.read();
        let files = (inner.first_segment..=inner.active.number)
            .map(segment_file_name)
            .collect();
        Ok(Some(Fileset::new(
            self.dir.clone(),
            files,
            BackendKind::LogStore,
            &self.name,
            self.order.name(),
            self.no_overwrite,
        )))
    }
}
