//! Handle-addressed arenas, one per record kind.
//!
//! A [`HandleRegistry`] maps a [`Handle`] to a record stored in a slot vector.
//! Freed slots go on a free list and are reissued with a bumped generation,
//! so a handle that outlived its record never resolves to the slot's new
//! occupant. A slot whose generation is exhausted is retired instead of
//! reused.
//!
//! ```text
//! raw handle (u64)
//! ┌────────┬──────────────────────┬────────────────────────────────┐
//! │ kind 8 │ generation 24        │ slot index 32                  │
//! └────────┴──────────────────────┴────────────────────────────────┘
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::error::{MosaicError, Result};
use crate::types::ObjectKind;

const INDEX_BITS: u32 = 32;
const GENERATION_BITS: u32 = 24;
const GENERATION_MASK: u32 = (1 << GENERATION_BITS) - 1;
const KIND_SHIFT: u32 = INDEX_BITS + GENERATION_BITS;

/// A record type that lives in a [`HandleRegistry`].
pub trait Record {
    const KIND: ObjectKind;
}

/// Untyped handle value as exchanged with foreign callers.
///
/// Always non-negative when read as an `i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawHandle(pub u64);

impl RawHandle {
    /// The record kind encoded in the handle, if the tag is recognised.
    pub fn kind(&self) -> Option<ObjectKind> {
        ObjectKind::from_tag(self.0 >> KIND_SHIFT)
    }

    pub fn as_i64(&self) -> i64 {
        self.0 as i64
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Typed handle to a record of kind `T`.
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Slot index inside the registry.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl<T: Record> Handle<T> {
    /// Encode as a raw integer carrying the record kind.
    pub fn to_raw(self) -> RawHandle {
        RawHandle(
            (T::KIND.tag() << KIND_SHIFT)
                | (u64::from(self.generation & GENERATION_MASK) << INDEX_BITS)
                | u64::from(self.index),
        )
    }

    /// Decode a raw integer, rejecting handles of another kind.
    ///
    /// This only checks the encoding; use the registry to check liveness.
    pub fn from_raw(raw: RawHandle) -> Result<Self> {
        if raw.kind() != Some(T::KIND) {
            return Err(MosaicError::invalid_handle(T::KIND, raw.0));
        }
        let generation = ((raw.0 >> INDEX_BITS) as u32) & GENERATION_MASK;
        let index = raw.0 as u32;
        Ok(Self::new(index, generation))
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T: Record> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}v{}", T::KIND, self.index, self.generation)
    }
}

impl<T: Record> fmt::Display for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_raw())
    }
}

enum Slot<T> {
    Occupied { generation: u32, record: T },
    Vacant { generation: u32, next_free: Option<u32> },
    /// Generation space used up; never handed out again.
    Retired,
}

/// Arena mapping handles to records of one kind.
pub struct HandleRegistry<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T: Record> HandleRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    /// Insert a record and return a handle that is not live for any other record.
    pub fn define(&mut self, record: T) -> Result<Handle<T>> {
        let handle = match self.free_head {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                let (generation, next_free) = match slot {
                    Slot::Vacant {
                        generation,
                        next_free,
                    } => (*generation, *next_free),
                    Slot::Occupied { .. } | Slot::Retired => {
                        return Err(MosaicError::RegistryFull(T::KIND));
                    }
                };
                *slot = Slot::Occupied { generation, record };
                self.free_head = next_free;
                Handle::new(index, generation)
            }
            None => {
                let index = u32::try_from(self.slots.len())
                    .map_err(|_| MosaicError::RegistryFull(T::KIND))?;
                self.slots.push(Slot::Occupied {
                    generation: 0,
                    record,
                });
                Handle::new(index, 0)
            }
        };
        self.len += 1;
        Ok(handle)
    }

    /// Resolve a handle to its live record.
    pub fn find(&self, handle: Handle<T>) -> Result<&T> {
        match self.slots.get(handle.index as usize) {
            Some(Slot::Occupied { generation, record }) if *generation == handle.generation => {
                Ok(record)
            }
            _ => Err(MosaicError::invalid_handle(T::KIND, handle.to_raw().0)),
        }
    }

    /// Resolve a handle to its live record for mutation.
    pub fn find_mut(&mut self, handle: Handle<T>) -> Result<&mut T> {
        match self.slots.get_mut(handle.index as usize) {
            Some(Slot::Occupied { generation, record }) if *generation == handle.generation => {
                Ok(record)
            }
            _ => Err(MosaicError::invalid_handle(T::KIND, handle.to_raw().0)),
        }
    }

    /// Resolve a raw integer handle, checking kind and liveness.
    pub fn resolve(&self, raw: RawHandle) -> Result<Handle<T>> {
        let handle = Handle::from_raw(raw)?;
        self.find(handle)?;
        Ok(handle)
    }

    /// Whether the handle currently names a live record.
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.find(handle).is_ok()
    }

    /// Remove a record and invalidate its handle.
    pub fn free(&mut self, handle: Handle<T>) -> Result<T> {
        self.find(handle)?;
        let replacement = if handle.generation >= GENERATION_MASK {
            Slot::Retired
        } else {
            Slot::Vacant {
                generation: handle.generation + 1,
                next_free: self.free_head,
            }
        };
        let retired = matches!(replacement, Slot::Retired);
        let slot = std::mem::replace(&mut self.slots[handle.index as usize], replacement);
        if !retired {
            self.free_head = Some(handle.index);
        }
        self.len -= 1;
        match slot {
            Slot::Occupied { record, .. } => Ok(record),
            Slot::Vacant { .. } | Slot::Retired => {
                Err(MosaicError::invalid_handle(T::KIND, handle.to_raw().0))
            }
        }
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over live records in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { generation, record } => {
                    Some((Handle::new(index as u32, *generation), record))
                }
                Slot::Vacant { .. } | Slot::Retired => None,
            })
    }
}

impl<T: Record> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
