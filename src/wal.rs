use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::limits::MAX_JOURNAL_RECORD_LEN;

/// Encode one record as `[len][bincode][crc32]`.
fn encode_record<E: Serialize>(writer: &mut impl Write, record: &E) -> io::Result<()> {
    let payload =
        bincode::serialize(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_JOURNAL_RECORD_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "record too large"));
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read exactly `buf.len()` bytes. `Ok(false)` on a clean or torn end of file.
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Append-only journal of serde records.
///
/// Format per entry: `[u32: len][bincode: E][u32: crc32]`, little-endian.
/// A torn or corrupt tail (crash mid-write) ends replay at the last good entry.
pub struct Wal<E> {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
    _record: PhantomData<fn(E)>,
}

impl<E: Serialize + DeserializeOwned> Wal<E> {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
            _record: PhantomData,
        })
    }

    /// Append and fsync in one go.
    #[cfg(test)]
    pub fn append(&mut self, record: &E) -> io::Result<()> {
        self.append_buffered(record)?;
        self.flush_sync()
    }

    /// Buffer a record; durable only after `flush_sync`.
    pub fn append_buffered(&mut self, record: &E) -> io::Result<()> {
        encode_record(&mut self.writer, record)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    fn tmp_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write a snapshot to the side file and fsync it. Slow; run before `swap_compact_file`.
    pub fn write_compact_file(path: &Path, records: &[E]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::tmp_path(path))?);
        for record in records {
            encode_record(&mut writer, record)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the snapshot over the journal and reopen for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::tmp_path(&self.path), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, records: &[E]) -> io::Result<()> {
        Self::write_compact_file(&self.path, records)?;
        self.swap_compact_file()
    }

    /// Read every intact record. A missing file replays as empty.
    pub fn replay(path: &Path) -> io::Result<Vec<E>> {
        Self::scan(path).map(|(records, _)| records)
    }

    /// Replay, then cut off any torn or corrupt tail so later appends land
    /// right after the last good record. Run before `open`.
    pub fn recover(path: &Path) -> io::Result<Vec<E>> {
        let (records, good_len) = Self::scan(path)?;
        let file = match OpenOptions::new().write(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(e),
        };
        let file_len = file.metadata()?.len();
        if file_len > good_len {
            warn!(
                "journal {}: dropping {} bytes of torn tail after {} records",
                path.display(),
                file_len - good_len,
                records.len()
            );
            file.set_len(good_len)?;
            file.sync_all()?;
        }
        Ok(records)
    }

    /// Intact records plus the byte length they occupy.
    fn scan(path: &Path) -> io::Result<(Vec<E>, u64)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut good_len = 0u64;

        loop {
            let mut len_buf = [0u8; 4];
            if !read_or_eof(&mut reader, &mut len_buf)? {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_JOURNAL_RECORD_LEN {
                break;
            }
            let mut payload = vec![0u8; len];
            if !read_or_eof(&mut reader, &mut payload)? {
                break;
            }
            let mut crc_buf = [0u8; 4];
            if !read_or_eof(&mut reader, &mut crc_buf)? {
                break;
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                break;
            }
            match bincode::deserialize::<E>(&payload) {
                Ok(record) => records.push(record),
                Err(_) => break,
            }
            good_len += 8 + len as u64;
        }

        Ok((records, good_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{at, Span};
    use crate::store::JournalEvent;

    type Journal = Wal<JournalEvent>;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("roomcal_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn created(id: &str) -> JournalEvent {
        JournalEvent::Created {
            id: id.into(),
            purpose: "Planning".into(),
            pic: "Sari".into(),
            span: Span::new(at("2025-03-03 10:00"), at("2025-03-03 11:00")),
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let events = vec![created("1"), JournalEvent::Deleted { id: "1".into() }];
        {
            let mut wal = Journal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }
        assert_eq!(Journal::replay(&path).unwrap(), events);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_stops_at_torn_tail() {
        let path = tmp_path("torn_tail.wal");
        {
            let mut wal = Journal::open(&path).unwrap();
            wal.append(&created("1")).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[9u8, 0, 0, 0, 1, 2]).unwrap(); // length says 9, only 2 bytes follow
        }
        assert_eq!(Journal::replay(&path).unwrap(), vec![created("1")]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn recover_truncates_torn_tail_before_new_appends() {
        let path = tmp_path("recover_torn.wal");
        {
            let mut wal = Journal::open(&path).unwrap();
            wal.append(&created("1")).unwrap();
        }
        let good_len = fs::metadata(&path).unwrap().len();
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[9u8, 0, 0, 0, 1, 2]).unwrap();
        }

        assert_eq!(Journal::recover(&path).unwrap(), vec![created("1")]);
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);
        {
            let mut wal = Journal::open(&path).unwrap();
            wal.append(&created("2")).unwrap();
        }
        assert_eq!(Journal::replay(&path).unwrap(), vec![created("1"), created("2")]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn recover_missing_file_is_empty() {
        let path = tmp_path("recover_missing.wal");
        assert!(Journal::recover(&path).unwrap().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn oversized_length_ends_replay() {
        let path = tmp_path("oversized.wal");
        {
            let mut wal = Journal::open(&path).unwrap();
            wal.append(&created("1")).unwrap();
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&u32::MAX.to_le_bytes()).unwrap();
            f.write_all(&[0u8; 16]).unwrap();
        }
        assert_eq!(Journal::replay(&path).unwrap(), vec![created("1")]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_missing_file_is_empty() {
        let path = tmp_path("missing.wal");
        assert!(Journal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn replay_stops_at_bad_crc() {
        let path = tmp_path("bad_crc.wal");
        {
            let payload = bincode::serialize(&created("1")).unwrap();
            let mut f = File::create(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEADBEEFu32.to_le_bytes()).unwrap();
        }
        assert!(Journal::replay(&path).unwrap().is_empty());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_shrinks_and_keeps_appending() {
        let path = tmp_path("compact.wal");
        {
            let mut wal = Journal::open(&path).unwrap();
            for i in 0..20 {
                let id = i.to_string();
                wal.append(&created(&id)).unwrap();
                wal.append(&JournalEvent::Deleted { id }).unwrap();
            }
            wal.append(&created("keep")).unwrap();
        }
        let before = fs::metadata(&path).unwrap().len();

        {
            let mut wal = Journal::open(&path).unwrap();
            wal.compact(&[created("keep")]).unwrap();
            assert_eq!(wal.appends_since_compact(), 0);
            wal.append(&JournalEvent::Deleted { id: "keep".into() }).unwrap();
        }
        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted journal should be smaller: {after} < {before}");

        let replayed = Journal::replay(&path).unwrap();
        assert_eq!(
            replayed,
            vec![created("keep"), JournalEvent::Deleted { id: "keep".into() }]
        );
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn buffered_appends_count_until_flush() {
        let path = tmp_path("buffered.wal");
        {
            let mut wal = Journal::open(&path).unwrap();
            for i in 0..5 {
                wal.append_buffered(&created(&i.to_string())).unwrap();
            }
            assert_eq!(wal.appends_since_compact(), 5);
            wal.flush_sync().unwrap();
        }
        assert_eq!(Journal::replay(&path).unwrap().len(), 5);
        let _ = fs::remove_file(&path);
    }
}
