use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use rand::Rng;

use crate::error::{GlauberError, Result};

/// Set with O(1) insertion, removal and uniform random choice.
///
/// Items live in a dense vector; `positions` maps each item to its slot.
/// Removal swaps the last item into the vacated slot.
#[derive(Clone, Debug)]
pub struct ActiveVertexSet<T> {
    items: Vec<T>,
    positions: HashMap<T, usize>,
}

impl<T> ActiveVertexSet<T>
where
    T: Copy + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity(capacity),
        }
    }

    /// Insert `item`; no-op if already present. Returns whether it was new.
    pub fn add(&mut self, item: T) -> bool {
        if self.positions.contains_key(&item) {
            return false;
        }
        self.positions.insert(item, self.items.len());
        self.items.push(item);
        true
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.add(item);
        }
    }

    pub fn remove(&mut self, item: T) -> Result<()> {
        let position = self
            .positions
            .remove(&item)
            .ok_or_else(|| GlauberError::AbsentVertex(format!("{item:?}")))?;
        self.items.swap_remove(position);
        if let Some(&moved) = self.items.get(position) {
            self.positions.insert(moved, position);
        }
        Ok(())
    }

    /// Uniformly random member, left in the set
    pub fn choose_random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        Some(self.items[rng.gen_range(0..self.items.len())])
    }

    /// Uniformly random member, taken out of the set
    pub fn pop_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let position = rng.gen_range(0..self.items.len());
        let item = self.items.swap_remove(position);
        self.positions.remove(&item);
        if let Some(&moved) = self.items.get(position) {
            self.positions.insert(moved, position);
        }
        Some(item)
    }

    pub fn contains(&self, item: &T) -> bool {
        self.positions.contains_key(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in slot order (insertion order until the first removal)
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.positions.clear();
    }
}

impl<T> Default for ActiveVertexSet<T>
where
    T: Copy + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}
