#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A handle into an [Arena]. Keys are assigned in insertion order and are
/// never reused, so a key also doubles as the construction-order index an
/// acyclic DAG relies on: a node can only ever reference keys smaller than
/// its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(transparent)]
pub struct ArenaKey(usize);

impl ArenaKey {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl AsRef<ArenaKey> for ArenaKey {
    fn as_ref(&self) -> &ArenaKey {
        self
    }
}

impl From<usize> for ArenaKey {
    fn from(index: usize) -> Self {
        ArenaKey(index)
    }
}

/// Append-only store keyed by [ArenaKey]. Used as the backing storage for
/// the random-variable DAG: nodes are pushed once and referenced by key for
/// the rest of their lifetime, which is exactly the "created earlier in
/// construction order" invariant the DAG relies on for acyclicity.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn insert(&mut self, item: T) -> ArenaKey {
        self.items.push(item);
        ArenaKey(self.items.len() - 1)
    }

    pub fn get(&self, index: impl AsRef<ArenaKey>) -> Option<&T> {
        self.items.get(index.as_ref().0)
    }

    pub fn get_mut(&mut self, index: impl AsRef<ArenaKey>) -> Option<&mut T> {
        self.items.get_mut(index.as_ref().0)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArenaKey, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, v)| (ArenaKey(i), v))
    }
}

impl<T> std::ops::Index<usize> for Arena<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.items[index]
    }
}

impl<T> std::ops::Index<ArenaKey> for Arena<T> {
    type Output = T;

    fn index(&self, index: ArenaKey) -> &Self::Output {
        &self.items[index.0]
    }
}
