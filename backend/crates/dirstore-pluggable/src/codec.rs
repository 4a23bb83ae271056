//! On-disk encodings of [`EntryIdSet`] values.
//!
//! ## V1
//!
//! ```text
//! defined:   id[0] id[1] ... id[n-1]          each 8 bytes big-endian
//! undefined: 0x80.. | approximate size         one 8-byte word, top bit set
//! ```
//!
//! ## V2 (compacted)
//!
//! ```text
//! varint((count << 1) | undefined)
//! defined only: varint(id[0]) varint(id[1] - id[0]) ...
//! ```
//!
//! Varints are little-endian base-128: seven payload bits per byte, high bit
//! set on every byte but the last.

use crate::entry_id_set::EntryIdSet;
use dirstore_commons::EntryId;
use dirstore_store::{Result, StorageError};

const UNDEFINED_MASK: u64 = 1 << 63;

/// Maximum encoded length of a u64 varint
pub const MAX_VARINT_LEN: usize = 10;

/// Appends `value` as a varint.
pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Reads a varint starting at `*pos`, advancing `*pos` past it.
pub fn read_varint(bytes: &[u8], pos: &mut usize) -> Option<u64> {
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
        let byte = *bytes.get(*pos)?;
        *pos += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some(value);
        }
    }
    None
}

/// Encoded length of `value` as a varint.
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

/// Codec version of an index, chosen from its persisted flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecVersion {
    V1,
    V2,
}

impl CodecVersion {
    pub fn encode(&self, set: &EntryIdSet) -> Vec<u8> {
        match self {
            CodecVersion::V1 => encode_v1(set),
            CodecVersion::V2 => encode_v2(set),
        }
    }

    pub fn decode(&self, key: &[u8], bytes: &[u8]) -> Result<EntryIdSet> {
        match self {
            CodecVersion::V1 => decode_v1(key, bytes),
            CodecVersion::V2 => decode_v2(key, bytes),
        }
    }
}

fn encode_v1(set: &EntryIdSet) -> Vec<u8> {
    match set.ids() {
        Some(ids) => {
            let mut out = Vec::with_capacity(ids.len() * EntryId::SIZE);
            for id in ids {
                out.extend_from_slice(&id.to_bytes());
            }
            out
        }
        None => (UNDEFINED_MASK | set.size()).to_be_bytes().to_vec(),
    }
}

fn decode_v1(key: &[u8], bytes: &[u8]) -> Result<EntryIdSet> {
    if bytes.len() % EntryId::SIZE != 0 {
        return Err(StorageError::corruption(format!(
            "entry ID set of {} bytes is not a multiple of {}",
            bytes.len(),
            EntryId::SIZE
        )));
    }
    let words = bytes
        .chunks_exact(EntryId::SIZE)
        .map(|chunk| {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            u64::from_be_bytes(word)
        })
        .collect::<Vec<_>>();

    if let [word] = words.as_slice() {
        if word & UNDEFINED_MASK != 0 {
            return Ok(EntryIdSet::undefined_with_size(key, word & !UNDEFINED_MASK));
        }
    }
    Ok(EntryIdSet::new_defined(key, words.into_iter().map(EntryId::new)))
}

fn encode_v2(set: &EntryIdSet) -> Vec<u8> {
    match set.ids() {
        Some(ids) => {
            let mut out = Vec::with_capacity(MAX_VARINT_LEN + ids.len() * 2);
            write_varint(&mut out, (ids.len() as u64) << 1);
            let mut previous = 0u64;
            for id in ids {
                write_varint(&mut out, id.as_u64() - previous);
                previous = id.as_u64();
            }
            out
        }
        None => {
            let mut out = Vec::with_capacity(MAX_VARINT_LEN);
            write_varint(&mut out, (set.size() << 1) | 1);
            out
        }
    }
}

fn decode_v2(key: &[u8], bytes: &[u8]) -> Result<EntryIdSet> {
    let truncated = || StorageError::corruption("truncated compacted entry ID set");
    let mut pos = 0;
    let header = read_varint(bytes, &mut pos).ok_or_else(truncated)?;
    let count = header >> 1;
    if header & 1 == 1 {
        return Ok(EntryIdSet::undefined_with_size(key, count));
    }

    let mut ids = Vec::with_capacity(count.min(bytes.len() as u64) as usize);
    let mut previous = 0u64;
    for _ in 0..count {
        let delta = read_varint(bytes, &mut pos).ok_or_else(truncated)?;
        previous = previous
            .checked_add(delta)
            .ok_or_else(|| StorageError::corruption("entry ID overflow in compacted set"))?;
        ids.push(EntryId::new(previous));
    }
    if pos != bytes.len() {
        return Err(StorageError::corruption(format!(
            "{} trailing bytes after compacted entry ID set",
            bytes.len() - pos
        )));
    }
    Ok(EntryIdSet::new_defined(key, ids))
}
