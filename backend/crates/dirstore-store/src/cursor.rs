//! Cursors over ordered trees and the transforming decorator used to build
//! typed cursors on top of raw byte cursors.
//!
//! A cursor starts unpositioned. `next()` on an unpositioned cursor moves to
//! the first record; once it runs off the end it stays undefined until it is
//! positioned again. Positioning always takes raw key bytes, whatever the
//! key type exposed by the cursor.

use crate::storage_trait::{Result, StorageError};
use std::fmt::Debug;

/// Forward-only iteration.
pub trait SequentialCursor {
    type Key;
    type Value;

    /// Moves to the next record. Returns `false` (and becomes undefined) at
    /// the end of the tree.
    fn next(&mut self) -> Result<bool>;

    /// Whether the cursor currently sits on a record.
    fn is_defined(&self) -> bool;

    fn key(&mut self) -> Result<Self::Key>;

    fn value(&mut self) -> Result<Self::Value>;

    /// Drains the remaining records, starting with the next one.
    fn read_remaining(&mut self) -> Result<Vec<(Self::Key, Self::Value)>>
    where
        Self: Sized,
    {
        let mut records = Vec::new();
        while self.next()? {
            records.push((self.key()?, self.value()?));
        }
        Ok(records)
    }
}

/// Random positioning on top of [`SequentialCursor`].
pub trait Cursor: SequentialCursor {
    /// Positions on exactly `key`. Undefined if absent.
    fn position_to_key(&mut self, key: &[u8]) -> Result<bool>;

    /// Positions on `key` or the first key after it.
    fn position_to_key_or_next(&mut self, key: &[u8]) -> Result<bool>;

    fn position_to_last_key(&mut self) -> Result<bool>;

    /// Positions on the record at ordinal `index` (0-based).
    fn position_to_index(&mut self, index: usize) -> Result<bool>;
}

/// Raw byte cursor handed out by storage engines.
pub type RawCursor<'a> = Box<dyn Cursor<Key = Vec<u8>, Value = Vec<u8>> + 'a>;

impl<C: SequentialCursor + ?Sized> SequentialCursor for Box<C> {
    type Key = C::Key;
    type Value = C::Value;

    fn next(&mut self) -> Result<bool> {
        (**self).next()
    }

    fn is_defined(&self) -> bool {
        (**self).is_defined()
    }

    fn key(&mut self) -> Result<Self::Key> {
        (**self).key()
    }

    fn value(&mut self) -> Result<Self::Value> {
        (**self).value()
    }
}

impl<C: Cursor + ?Sized> Cursor for Box<C> {
    fn position_to_key(&mut self, key: &[u8]) -> Result<bool> {
        (**self).position_to_key(key)
    }

    fn position_to_key_or_next(&mut self, key: &[u8]) -> Result<bool> {
        (**self).position_to_key_or_next(key)
    }

    fn position_to_last_key(&mut self) -> Result<bool> {
        (**self).position_to_last_key()
    }

    fn position_to_index(&mut self, index: usize) -> Result<bool> {
        (**self).position_to_index(index)
    }
}

/// Key transform of a [`CursorTransformer`].
pub type KeyTransform<'f, KI, KO> = Box<dyn Fn(&KI) -> Result<KO> + 'f>;

/// Value transform of a [`CursorTransformer`]; sees the untransformed key too.
pub type ValueTransform<'f, KI, VI, VO> = Box<dyn Fn(&KI, &VI) -> Result<VO> + 'f>;

/// Lazily remaps the keys and values of an inner cursor.
///
/// Transformed values are computed on first access and cached until the next
/// positioning call, so each transform runs at most once per position.
/// Transformers can wrap other transformers.
pub struct CursorTransformer<'f, C, KO, VO>
where
    C: SequentialCursor,
{
    input: C,
    key_transform: KeyTransform<'f, C::Key, KO>,
    value_transform: ValueTransform<'f, C::Key, C::Value, VO>,
    cached_key: Option<KO>,
    cached_value: Option<VO>,
}

impl<'f, C, KO, VO> CursorTransformer<'f, C, KO, VO>
where
    C: SequentialCursor,
    C::Key: Debug,
    C::Value: Debug,
    KO: Clone,
    VO: Clone,
{
    pub fn transform_keys_and_values(
        input: C,
        key_transform: impl Fn(&C::Key) -> Result<KO> + 'f,
        value_transform: impl Fn(&C::Key, &C::Value) -> Result<VO> + 'f,
    ) -> Self {
        Self {
            input,
            key_transform: Box::new(key_transform),
            value_transform: Box::new(value_transform),
            cached_key: None,
            cached_value: None,
        }
    }

    pub fn inner(&self) -> &C {
        &self.input
    }

    pub fn into_inner(self) -> C {
        self.input
    }

    fn invalidate(&mut self) {
        self.cached_key = None;
        self.cached_value = None;
    }
}

impl<'f, C, VO> CursorTransformer<'f, C, C::Key, VO>
where
    C: SequentialCursor,
    C::Key: Debug + Clone + 'f,
    C::Value: Debug,
    VO: Clone,
{
    /// Keeps keys as they are and transforms values only.
    pub fn transform_values(
        input: C,
        value_transform: impl Fn(&C::Key, &C::Value) -> Result<VO> + 'f,
    ) -> Self {
        Self::transform_keys_and_values(input, |key: &C::Key| Ok(key.clone()), value_transform)
    }
}

fn transformation_error(key: &dyn Debug, value: Option<&dyn Debug>, cause: StorageError) -> StorageError {
    match cause {
        already @ StorageError::Transformation { .. } => already,
        cause => StorageError::Transformation {
            key: format!("{:?}", key),
            value: value.map(|v| format!("{:?}", v)).unwrap_or_default(),
            reason: cause.to_string(),
        },
    }
}

impl<'f, C, KO, VO> SequentialCursor for CursorTransformer<'f, C, KO, VO>
where
    C: SequentialCursor,
    C::Key: Debug,
    C::Value: Debug,
    KO: Clone,
    VO: Clone,
{
    type Key = KO;
    type Value = VO;

    fn next(&mut self) -> Result<bool> {
        self.invalidate();
        self.input.next()
    }

    fn is_defined(&self) -> bool {
        self.input.is_defined()
    }

    fn key(&mut self) -> Result<KO> {
        if let Some(key) = &self.cached_key {
            return Ok(key.clone());
        }
        let key = self.input.key()?;
        let transformed =
            (self.key_transform)(&key).map_err(|e| transformation_error(&key, None, e))?;
        self.cached_key = Some(transformed.clone());
        Ok(transformed)
    }

    fn value(&mut self) -> Result<VO> {
        if let Some(value) = &self.cached_value {
            return Ok(value.clone());
        }
        let key = self.input.key()?;
        let value = self.input.value()?;
        let transformed = (self.value_transform)(&key, &value)
            .map_err(|e| transformation_error(&key, Some(&value), e))?;
        self.cached_value = Some(transformed.clone());
        Ok(transformed)
    }
}

impl<'f, C, KO, VO> Cursor for CursorTransformer<'f, C, KO, VO>
where
    C: Cursor,
    C::Key: Debug,
    C::Value: Debug,
    KO: Clone,
    VO: Clone,
{
    fn position_to_key(&mut self, key: &[u8]) -> Result<bool> {
        self.invalidate();
        self.input.position_to_key(key)
    }

    fn position_to_key_or_next(&mut self, key: &[u8]) -> Result<bool> {
        self.invalidate();
        self.input.position_to_key_or_next(key)
    }

    fn position_to_last_key(&mut self) -> Result<bool> {
        self.invalidate();
        self.input.position_to_last_key()
    }

    fn position_to_index(&mut self, index: usize) -> Result<bool> {
        self.invalidate();
        self.input.position_to_index(index)
    }
}

/// Cursor over an in-memory sorted slice of records. Used by the in-memory
/// engine's tests and by callers that need a cursor over materialized data.
pub struct VecCursor {
    records: Vec<(Vec<u8>, Vec<u8>)>,
    position: Option<usize>,
    exhausted: bool,
}

impl VecCursor {
    /// `records` must be sorted by key.
    pub fn new(records: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        Self {
            records,
            position: None,
            exhausted: false,
        }
    }

    fn set_position(&mut self, position: Option<usize>) -> bool {
        self.exhausted = position.is_none();
        self.position = position;
        position.is_some()
    }

    fn current(&self) -> Result<&(Vec<u8>, Vec<u8>)> {
        self.position
            .and_then(|p| self.records.get(p))
            .ok_or(StorageError::CursorNotPositioned)
    }
}

impl SequentialCursor for VecCursor {
    type Key = Vec<u8>;
    type Value = Vec<u8>;

    fn next(&mut self) -> Result<bool> {
        if self.exhausted {
            return Ok(false);
        }
        let next = self.position.map_or(0, |p| p + 1);
        Ok(self.set_position((next < self.records.len()).then_some(next)))
    }

    fn is_defined(&self) -> bool {
        self.position.is_some()
    }

    fn key(&mut self) -> Result<Vec<u8>> {
        Ok(self.current()?.0.clone())
    }

    fn value(&mut self) -> Result<Vec<u8>> {
        Ok(self.current()?.1.clone())
    }
}

impl Cursor for VecCursor {
    fn position_to_key(&mut self, key: &[u8]) -> Result<bool> {
        let found = self
            .records
            .binary_search_by(|(k, _)| k.as_slice().cmp(key))
            .ok();
        Ok(self.set_position(found))
    }

    fn position_to_key_or_next(&mut self, key: &[u8]) -> Result<bool> {
        let index = self.records.partition_point(|(k, _)| k.as_slice() < key);
        Ok(self.set_position((index < self.records.len()).then_some(index)))
    }

    fn position_to_last_key(&mut self) -> Result<bool> {
        Ok(self.set_position(self.records.len().checked_sub(1)))
    }

    fn position_to_index(&mut self, index: usize) -> Result<bool> {
        Ok(self.set_position((index < self.records.len()).then_some(index)))
    }
}
