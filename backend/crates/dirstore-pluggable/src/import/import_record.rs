//! Index records exchanged between the two import phases.

use std::cmp::Ordering;
use std::io::{self, Read, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ImportOp {
    Delete = 0,
    Insert = 1,
}

impl ImportOp {
    fn from_byte(byte: u8) -> io::Result<Self> {
        match byte {
            0 => Ok(ImportOp::Delete),
            1 => Ok(ImportOp::Insert),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unknown import record operation {}", other),
            )),
        }
    }
}

/// One key of one index, to be inserted or deleted.
///
/// Sorted by key, then index, then operation so that every change to a key
/// arrives together during the merge, deletions first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportRecord {
    op: ImportOp,
    index_id: u32,
    key: Vec<u8>,
}

impl ImportRecord {
    pub fn new(op: ImportOp, index_id: u32, key: impl Into<Vec<u8>>) -> Self {
        Self {
            op,
            index_id,
            key: key.into(),
        }
    }

    pub fn insert(index_id: u32, key: impl Into<Vec<u8>>) -> Self {
        Self::new(ImportOp::Insert, index_id, key)
    }

    pub fn delete(index_id: u32, key: impl Into<Vec<u8>>) -> Self {
        Self::new(ImportOp::Delete, index_id, key)
    }

    pub fn op(&self) -> ImportOp {
        self.op
    }

    pub fn index_id(&self) -> u32 {
        self.index_id
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Same index and key, whatever the operation.
    pub fn same_target(&self, other: &ImportRecord) -> bool {
        self.index_id == other.index_id && self.key == other.key
    }

    /// `op | index id (u32 BE) | key length (u32 BE) | key`
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let key_len = u32::try_from(self.key.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Index key too long"))?;
        out.write_all(&[self.op as u8])?;
        out.write_all(&self.index_id.to_be_bytes())?;
        out.write_all(&key_len.to_be_bytes())?;
        out.write_all(&self.key)
    }

    /// Reads one record, or `None` on a clean end of input.
    pub fn read_from<R: Read>(input: &mut R) -> io::Result<Option<Self>> {
        let mut op = [0u8; 1];
        match input.read_exact(&mut op) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err),
        }
        let mut word = [0u8; 4];
        input.read_exact(&mut word)?;
        let index_id = u32::from_be_bytes(word);
        input.read_exact(&mut word)?;
        let mut key = vec![0u8; u32::from_be_bytes(word) as usize];
        input.read_exact(&mut key)?;
        Ok(Some(Self {
            op: ImportOp::from_byte(op[0])?,
            index_id,
            key,
        }))
    }
}

impl Ord for ImportRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then(self.index_id.cmp(&other.index_id))
            .then(self.op.cmp(&other.op))
    }
}

impl PartialOrd for ImportRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
