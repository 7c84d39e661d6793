//! On-disk query state
//!
//! File format:
//! ```text
//! +----------------+----------------+----------------+
//! | Header (8B)    | Record 1       | Record 2 ...   |
//! +----------------+----------------+----------------+
//!
//! Header:
//! - magic: 4 bytes "BQRY"
//! - version: 2 bytes
//! - kind: 2 bytes (QUERY=1, HITS=2, RIDS=3, BUNDLES=4)
//!
//! Record:
//! - tag: 1 byte
//! - payload_len: 4 bytes
//! - payload: variable (bincode serialized)
//! - crc32: 4 bytes over tag, length and payload
//! ```
//!
//! Readers skip records with unknown tags. Files are written to a temporary
//! name and renamed into place.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::bitvector::Bitvector;
use crate::expr::QExpr;
use crate::{QueryError, Result};

use super::bundle::Bundle;
use super::QueryState;

const MAGIC: &[u8; 4] = b"BQRY";
const VERSION: u16 = 1;
const HEADER_SIZE: usize = 8;

pub(crate) const QUERY_FILE: &str = "query";
pub(crate) const HITS_FILE: &str = "hits";
pub(crate) const RIDS_FILE: &str = "-rids";
pub(crate) const BUNDLES_FILE: &str = "bundles";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
enum FileKind {
    Query = 1,
    Hits = 2,
    Rids = 3,
    Bundles = 4,
}

// Record tags
const TAG_USER: u8 = 1;
const TAG_DATASET: u8 = 2;
const TAG_SELECT: u8 = 3;
const TAG_STATE: u8 = 4;
const TAG_TIMESTAMP: u8 = 5;
const TAG_WHERE: u8 = 6;
const TAG_PREDICATE: u8 = 7;
const TAG_RIDS: u8 = 8;
const TAG_BITVECTOR: u8 = 16;
const TAG_RID_LIST: u8 = 17;
const TAG_BUNDLES: u8 = 18;

/// Contents of the `query` file
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QueryRecord {
    pub user: String,
    pub dataset: String,
    pub select: Option<String>,
    pub state: QueryState,
    pub timestamp: u64,
    pub where_text: Option<String>,
    pub predicate: Option<QExpr>,
    pub rids: Option<Vec<u64>>,
}

// ============================================================================
// Record framing
// ============================================================================

struct RecordWriter {
    path: PathBuf,
    tmp: PathBuf,
    out: BufWriter<File>,
}

impl RecordWriter {
    fn create(path: &Path, kind: FileKind) -> Result<Self> {
        let tmp = path.with_extension("tmp");
        let file = File::create(&tmp)?;
        let mut out = BufWriter::new(file);
        out.write_all(MAGIC)?;
        out.write_all(&VERSION.to_le_bytes())?;
        out.write_all(&(kind as u16).to_le_bytes())?;
        Ok(Self { path: path.to_path_buf(), tmp, out })
    }

    fn record<T: Serialize + ?Sized>(&mut self, tag: u8, value: &T) -> Result<()> {
        let payload = bincode::serialize(value)?;
        let len = payload.len() as u32;
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&[tag]);
        hasher.update(&len.to_le_bytes());
        hasher.update(&payload);
        let crc = hasher.finalize();

        self.out.write_all(&[tag])?;
        self.out.write_all(&len.to_le_bytes())?;
        self.out.write_all(&payload)?;
        self.out.write_all(&crc.to_le_bytes())?;
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        drop(self.out);
        fs::rename(&self.tmp, &self.path)?;
        Ok(())
    }
}

/// Read every record of a file, checking header and checksums
fn read_records(path: &Path, kind: FileKind) -> Result<Vec<(u8, Vec<u8>)>> {
    let mut input = BufReader::new(File::open(path)?);
    let mut bytes = Vec::new();
    input.read_to_end(&mut bytes)?;

    if bytes.len() < HEADER_SIZE || &bytes[0..4] != MAGIC {
        return Err(QueryError::InvalidFileFormat);
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(QueryError::VersionMismatch { expected: VERSION, actual: version });
    }
    let file_kind = u16::from_le_bytes([bytes[6], bytes[7]]);
    if file_kind != kind as u16 {
        return Err(QueryError::InvalidFileFormat);
    }

    let mut records = Vec::new();
    let mut pos = HEADER_SIZE;
    while pos < bytes.len() {
        if pos + 5 > bytes.len() {
            return Err(QueryError::InvalidFileFormat);
        }
        let tag = bytes[pos];
        let len = u32::from_le_bytes([bytes[pos + 1], bytes[pos + 2], bytes[pos + 3], bytes[pos + 4]]) as usize;
        let body_end = pos + 5 + len;
        if body_end + 4 > bytes.len() {
            return Err(QueryError::InvalidFileFormat);
        }
        let stored = u32::from_le_bytes([bytes[body_end], bytes[body_end + 1], bytes[body_end + 2], bytes[body_end + 3]]);
        if crc32fast::hash(&bytes[pos..body_end]) != stored {
            return Err(QueryError::ChecksumMismatch);
        }
        records.push((tag, bytes[pos + 5..body_end].to_vec()));
        pos = body_end + 4;
    }
    Ok(records)
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(payload)?)
}

/// Payload of the first record with `tag`
fn single<T: DeserializeOwned>(records: &[(u8, Vec<u8>)], tag: u8) -> Result<T> {
    let payload = records
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, p)| p)
        .ok_or(QueryError::InvalidFileFormat)?;
    decode(payload)
}

// ============================================================================
// Query files
// ============================================================================

pub(crate) fn write_query(dir: &Path, rec: &QueryRecord) -> Result<()> {
    fs::create_dir_all(dir)?;
    let mut w = RecordWriter::create(&dir.join(QUERY_FILE), FileKind::Query)?;
    w.record(TAG_USER, &rec.user)?;
    w.record(TAG_DATASET, &rec.dataset)?;
    w.record(TAG_SELECT, &rec.select)?;
    w.record(TAG_STATE, &rec.state)?;
    w.record(TAG_TIMESTAMP, &rec.timestamp)?;
    w.record(TAG_WHERE, &rec.where_text)?;
    w.record(TAG_PREDICATE, &rec.predicate)?;
    w.record(TAG_RIDS, &rec.rids)?;
    w.finish()
}

pub(crate) fn read_query(dir: &Path) -> Result<QueryRecord> {
    let records = read_records(&dir.join(QUERY_FILE), FileKind::Query)?;
    let mut rec = QueryRecord {
        user: String::new(),
        dataset: String::new(),
        select: None,
        state: QueryState::Uninitialized,
        timestamp: 0,
        where_text: None,
        predicate: None,
        rids: None,
    };
    let mut seen_dataset = false;
    for (tag, payload) in &records {
        match *tag {
            TAG_USER => rec.user = decode(payload)?,
            TAG_DATASET => {
                rec.dataset = decode(payload)?;
                seen_dataset = true;
            }
            TAG_SELECT => rec.select = decode(payload)?,
            TAG_STATE => rec.state = decode(payload)?,
            TAG_TIMESTAMP => rec.timestamp = decode(payload)?,
            TAG_WHERE => rec.where_text = decode(payload)?,
            TAG_PREDICATE => rec.predicate = decode(payload)?,
            TAG_RIDS => rec.rids = decode(payload)?,
            other => log::debug!("Skipping unknown record tag {} in {:?}", other, dir),
        }
    }
    if !seen_dataset {
        return Err(QueryError::InvalidFileFormat);
    }
    Ok(rec)
}

pub(crate) fn write_hits(dir: &Path, hits: &Bitvector) -> Result<()> {
    fs::create_dir_all(dir)?;
    let mut w = RecordWriter::create(&dir.join(HITS_FILE), FileKind::Hits)?;
    w.record(TAG_BITVECTOR, hits)?;
    w.finish()
}

pub(crate) fn read_hits(dir: &Path) -> Result<Bitvector> {
    single(&read_records(&dir.join(HITS_FILE), FileKind::Hits)?, TAG_BITVECTOR)
}

pub(crate) fn write_rids(dir: &Path, rids: &[u64]) -> Result<()> {
    fs::create_dir_all(dir)?;
    let mut w = RecordWriter::create(&dir.join(RIDS_FILE), FileKind::Rids)?;
    w.record(TAG_RID_LIST, rids)?;
    w.finish()
}

pub(crate) fn read_rids(dir: &Path) -> Result<Vec<u64>> {
    single(&read_records(&dir.join(RIDS_FILE), FileKind::Rids)?, TAG_RID_LIST)
}

pub(crate) fn write_bundles(dir: &Path, bundles: &[Bundle]) -> Result<()> {
    fs::create_dir_all(dir)?;
    let mut w = RecordWriter::create(&dir.join(BUNDLES_FILE), FileKind::Bundles)?;
    w.record(TAG_BUNDLES, bundles)?;
    w.finish()
}

pub(crate) fn read_bundles(dir: &Path) -> Result<Vec<Bundle>> {
    single(&read_records(&dir.join(BUNDLES_FILE), FileKind::Bundles)?, TAG_BUNDLES)
}

/// Delete the result files (hits, row ids, bundles), keeping `query`
pub(crate) fn remove_results(dir: &Path) -> Result<()> {
    for name in [HITS_FILE, RIDS_FILE, BUNDLES_FILE] {
        match fs::remove_file(dir.join(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Value;
    use crate::expr::parse_where;

    fn record() -> QueryRecord {
        QueryRecord {
            user: "alice".into(),
            dataset: "t".into(),
            select: Some("a, b".into()),
            state: QueryState::FullEvaluate,
            timestamp: 7,
            where_text: Some("a > 1 AND JOIN(a, b, 2)".into()),
            predicate: Some(parse_where("a > 1 AND JOIN(a, b, 2)").unwrap()),
            rids: Some(vec![4, 9]),
        }
    }

    #[test]
    fn test_query_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        write_query(dir.path(), &record()).unwrap();
        assert_eq!(read_query(dir.path()).unwrap(), record());
    }

    #[test]
    fn test_result_files() {
        let dir = tempfile::tempdir().unwrap();
        let hits = Bitvector::from_positions([1, 5, 900], 1000);
        write_hits(dir.path(), &hits).unwrap();
        write_rids(dir.path(), &[11, 15]).unwrap();
        let bundles = vec![Bundle { values: vec![Value::Int(3)], rows: vec![1, 5] }];
        write_bundles(dir.path(), &bundles).unwrap();
        assert_eq!(read_hits(dir.path()).unwrap(), hits);
        assert_eq!(read_rids(dir.path()).unwrap(), vec![11, 15]);
        assert_eq!(read_bundles(dir.path()).unwrap(), bundles);
        remove_results(dir.path()).unwrap();
        assert!(read_hits(dir.path()).is_err());
        remove_results(dir.path()).unwrap();
    }

    #[test]
    fn test_corruption_detected() {
        let dir = tempfile::tempdir().unwrap();
        write_hits(dir.path(), &Bitvector::ones(100)).unwrap();
        let path = dir.path().join(HITS_FILE);
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 6;
        bytes[last] ^= 0xff;
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(read_hits(dir.path()), Err(QueryError::ChecksumMismatch)));

        bytes[0] = b'X';
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(read_hits(dir.path()), Err(QueryError::InvalidFileFormat)));
    }

    #[test]
    fn test_unknown_tags_skipped_and_version_checked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(QUERY_FILE);
        let mut w = RecordWriter::create(&path, FileKind::Query).unwrap();
        w.record(99, &"future field").unwrap();
        w.record(TAG_DATASET, &"t").unwrap();
        w.finish().unwrap();
        assert_eq!(read_query(dir.path()).unwrap().dataset, "t");

        let mut bytes = fs::read(&path).unwrap();
        bytes[4] = 9;
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(read_query(dir.path()), Err(QueryError::VersionMismatch { actual: 9, .. })));
    }
}
