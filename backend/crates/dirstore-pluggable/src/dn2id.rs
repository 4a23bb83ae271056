//! DN → EntryID tree.
//!
//! Keys follow [`crate::dn_key`], so an entry's subtree is a contiguous key
//! range starting right after the entry itself. Two cursors exploit that:
//!
//! - [`ChildrenCursor`]: immediate children only. After each child it seeks
//!   past the child's whole subtree instead of scanning it.
//! - [`SubtreeCursor`]: every descendant, in key order.

use crate::dn_key::{after_last_child_of, before_first_child_of, dn_to_dn_key, is_child};
use dirstore_commons::{Dn, EntryId, TreeName};
use dirstore_store::{
    Cursor, CursorTransformer, RawCursor, ReadableTransaction, Result, SequentialCursor,
    StorageError, Tree, WriteableTransaction,
};

/// Cursor over dn2id: raw DN keys, decoded entry IDs.
pub type Dn2IdCursor<'t> = CursorTransformer<'static, RawCursor<'t>, Vec<u8>, EntryId>;

#[derive(Debug, Clone)]
pub struct Dn2Id {
    name: TreeName,
    base_dn: Dn,
}

impl Dn2Id {
    pub fn new(name: TreeName, base_dn: Dn) -> Self {
        Self { name, base_dn }
    }

    pub fn base_dn(&self) -> &Dn {
        &self.base_dn
    }

    /// Key of `dn` in this tree.
    pub fn dn_to_key(&self, dn: &Dn) -> Vec<u8> {
        dn_to_dn_key(dn, self.base_dn.size())
    }

    pub fn put(&self, txn: &mut dyn WriteableTransaction, dn: &Dn, id: EntryId) -> Result<()> {
        txn.put(&self.name, &self.dn_to_key(dn), &id.to_bytes())
    }

    /// Inserts only if `dn` is not mapped yet. Returns `true` on insert.
    pub fn insert(&self, txn: &mut dyn WriteableTransaction, dn: &Dn, id: EntryId) -> Result<bool> {
        txn.put_if_absent(&self.name, &self.dn_to_key(dn), &id.to_bytes())
    }

    /// Returns `true` if `dn` was mapped.
    pub fn remove(&self, txn: &mut dyn WriteableTransaction, dn: &Dn) -> Result<bool> {
        txn.delete(&self.name, &self.dn_to_key(dn))
    }

    pub fn get<T>(&self, txn: &T, dn: &Dn) -> Result<Option<EntryId>>
    where
        T: ReadableTransaction + ?Sized,
    {
        match txn.read(&self.name, &self.dn_to_key(dn))? {
            Some(bytes) => Ok(Some(EntryId::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn open_cursor<'t, T>(&self, txn: &'t T) -> Result<Dn2IdCursor<'t>>
    where
        T: ReadableTransaction + ?Sized,
    {
        let raw = txn.open_cursor(&self.name)?;
        Ok(CursorTransformer::transform_values(raw, |_key, value: &Vec<u8>| {
            Ok(EntryId::from_bytes(value)?)
        }))
    }

    /// Cursor over the immediate children of `dn`.
    pub fn open_children_cursor<'t, T>(&self, txn: &'t T, dn: &Dn) -> Result<ChildrenCursor<Dn2IdCursor<'t>>>
    where
        T: ReadableTransaction + ?Sized,
    {
        ChildrenCursor::new(self.open_cursor(txn)?, self.dn_to_key(dn))
    }

    /// Cursor over every descendant of `dn`, excluding `dn` itself.
    pub fn open_subordinates_cursor<'t, T>(&self, txn: &'t T, dn: &Dn) -> Result<SubtreeCursor<Dn2IdCursor<'t>>>
    where
        T: ReadableTransaction + ?Sized,
    {
        Ok(SubtreeCursor::new(self.open_cursor(txn)?, self.dn_to_key(dn)))
    }
}

impl Tree for Dn2Id {
    fn name(&self) -> &TreeName {
        &self.name
    }
}

/// Iterates the immediate children of a parent key.
///
/// Starts on the parent key (or where it would be), steps once to reach the
/// first child, then for each following child seeks to
/// `after_last_child_of(current)`, skipping the current child's subtree.
pub struct ChildrenCursor<C> {
    delegate: C,
    parent_key: Vec<u8>,
    started: bool,
    defined: bool,
}

impl<C> ChildrenCursor<C>
where
    C: Cursor<Key = Vec<u8>>,
{
    pub fn new(mut delegate: C, parent_key: Vec<u8>) -> Result<Self> {
        delegate.position_to_key_or_next(&parent_key)?;
        Ok(Self {
            delegate,
            parent_key,
            started: false,
            defined: false,
        })
    }

    pub fn parent_key(&self) -> &[u8] {
        &self.parent_key
    }
}

impl<C> SequentialCursor for ChildrenCursor<C>
where
    C: Cursor<Key = Vec<u8>>,
{
    type Key = Vec<u8>;
    type Value = C::Value;

    fn next(&mut self) -> Result<bool> {
        let moved = if !self.started {
            self.started = true;
            if self.delegate.is_defined() && self.delegate.key()? == self.parent_key {
                self.delegate.next()?
            } else {
                self.delegate.is_defined()
            }
        } else if self.defined {
            let current = self.delegate.key()?;
            self.delegate.position_to_key_or_next(&after_last_child_of(&current))?
        } else {
            false
        };
        self.defined = moved && is_child(&self.parent_key, &self.delegate.key()?);
        Ok(self.defined)
    }

    fn is_defined(&self) -> bool {
        self.defined
    }

    fn key(&mut self) -> Result<Vec<u8>> {
        if !self.defined {
            return Err(StorageError::CursorNotPositioned);
        }
        self.delegate.key()
    }

    fn value(&mut self) -> Result<C::Value> {
        if !self.defined {
            return Err(StorageError::CursorNotPositioned);
        }
        self.delegate.value()
    }
}

/// Iterates every key below a parent key.
pub struct SubtreeCursor<C> {
    delegate: C,
    prefix: Vec<u8>,
    started: bool,
    defined: bool,
}

impl<C> SubtreeCursor<C>
where
    C: Cursor<Key = Vec<u8>>,
{
    pub fn new(delegate: C, parent_key: Vec<u8>) -> Self {
        Self {
            delegate,
            prefix: before_first_child_of(&parent_key),
            started: false,
            defined: false,
        }
    }
}

impl<C> SequentialCursor for SubtreeCursor<C>
where
    C: Cursor<Key = Vec<u8>>,
{
    type Key = Vec<u8>;
    type Value = C::Value;

    fn next(&mut self) -> Result<bool> {
        let moved = if !self.started {
            self.started = true;
            self.delegate.position_to_key_or_next(&self.prefix)?
        } else if self.defined {
            self.delegate.next()?
        } else {
            false
        };
        self.defined = moved && self.delegate.key()?.starts_with(&self.prefix);
        Ok(self.defined)
    }

    fn is_defined(&self) -> bool {
        self.defined
    }

    fn key(&mut self) -> Result<Vec<u8>> {
        if !self.defined {
            return Err(StorageError::CursorNotPositioned);
        }
        self.delegate.key()
    }

    fn value(&mut self) -> Result<C::Value> {
        if !self.defined {
            return Err(StorageError::CursorNotPositioned);
        }
        self.delegate.value()
    }
}
