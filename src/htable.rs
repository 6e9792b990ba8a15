//! A hand-rolled Robin Hood open-addressing hash table.
//!
//! This is the one piece of the crate that deliberately does *not* reach for
//! `std::collections::HashMap` or `hashbrown`: the interning tables need
//! exact control over how probing, rehashing and deletion interact with
//! pointer-identity keys, and implementing that control is itself part of
//! the exercise. Every other map in the crate (the serializer's index
//! tables, the scope/FV worklists) is a plain `std::collections::HashMap`,
//! matching the rest of the corpus's habit of reaching for the standard
//! collection except where a specialized one is the point.
//!
//! The algorithm mirrors a classic Robin Hood table: each slot stores the
//! inserted element's hash with the high bit (`OCCUPIED_BIT`) marking
//! occupancy, insertion swaps the incoming element into a slot whenever the
//! resident has a smaller distance-to-initial-bucket (DIB), and deletion
//! shifts the following run of entries back by one so the DIB invariant
//! (`dib(slot) >= 0` and non-decreasing along a probe run until an empty
//! slot) is preserved without tombstones.

/// A value that can live in a [`HTable`].
///
/// Implementations are expected to be cheap `Copy` types — in practice,
/// interned `&'a Type<'a>` / `&'a Node<'a>` references — since the table
/// moves elements around on every insert and delete.
pub trait Entry: Copy {
  /// Hash used to place this entry. The high bit is reserved by the table
  /// to mark slot occupancy and is masked out of whatever this returns.
  fn hash(&self) -> u32;
  /// Structural/identity equality used to detect duplicate keys.
  fn matches(&self, other: &Self) -> bool;
}

const OCCUPIED_BIT: u32 = 0x8000_0000;
const INITIAL_CAP: usize = 8;

/// Robin Hood open-addressed hash table over entries of type `T`.
pub struct HTable<T: Entry> {
  elems: Vec<Option<T>>,
  hashes: Vec<u32>,
  nelems: usize,
}

impl<T: Entry> Default for HTable<T> {
  fn default() -> Self { Self::new() }
}

impl<T: Entry> HTable<T> {
  /// Create an empty table with a small initial capacity.
  pub fn new() -> Self { Self::with_capacity(INITIAL_CAP) }

  /// Create an empty table whose backing storage can hold at least
  /// `cap` entries before the first rehash. `cap` is rounded up to a power
  /// of two, matching the C implementation's `cap & (cap - 1) == 0`
  /// invariant (probe-index wraparound is done with a mask, not `%`).
  pub fn with_capacity(cap: usize) -> Self {
    let cap = cap.max(1).next_power_of_two();
    Self { elems: vec![None; cap], hashes: vec![0; cap], nelems: 0 }
  }

  /// Number of entries currently stored.
  pub fn len(&self) -> usize { self.nelems }
  pub fn is_empty(&self) -> bool { self.nelems == 0 }
  pub fn capacity(&self) -> usize { self.hashes.len() }

  fn bucket(hash: u32, cap: usize) -> usize { (hash as usize) & (cap - 1) }

  /// Distance from `index` back to the bucket `expected` that `index`'s
  /// occupant would ideally sit in, accounting for wraparound.
  fn dib(index: usize, expected: usize, cap: usize) -> usize {
    if index < expected { (cap + index) - expected } else { index - expected }
  }

  /// Look up `key`, returning the slot index holding a matching entry.
  pub fn lookup(&self, key: &T) -> Option<usize> {
    let cap = self.capacity();
    let hash = key.hash() & !OCCUPIED_BIT;
    let mut index = Self::bucket(hash, cap);
    let mut dib = 0usize;
    loop {
      let next_hash = self.hashes[index];
      if next_hash & OCCUPIED_BIT == 0 { return None; }
      let next_hash = next_hash & !OCCUPIED_BIT;
      let next_index = Self::bucket(next_hash, cap);
      let next_dib = Self::dib(index, next_index, cap);
      if next_dib < dib { return None; }
      if self.elems[index].as_ref().is_some_and(|e| e.matches(key)) { return Some(index); }
      dib += 1;
      index = if index + 1 >= cap { 0 } else { index + 1 };
    }
  }

  /// Find the interned entry equal to `key`, if any.
  pub fn find(&self, key: &T) -> Option<T> { self.lookup(key).map(|i| self.elems[i].expect("occupied slot")) }

  /// Insert `elem` if no entry matching it is already present. Returns
  /// `true` if the element was newly inserted, `false` if an equal entry
  /// already occupied the table.
  pub fn insert(&mut self, elem: T) -> bool {
    let hash = elem.hash() & !OCCUPIED_BIT;
    if !Self::insert_internal(&mut self.elems, &mut self.hashes, elem, hash, true) { return false; }
    self.nelems += 1;
    let cap = self.capacity();
    if self.nelems * 100 > 80 * cap { self.rehash(cap * 2); }
    true
  }

  /// Core Robin Hood insertion loop, shared between fresh inserts and
  /// rehashing (where duplicate-checking is skipped since every element
  /// being reinserted is already known-unique).
  fn insert_internal(elems: &mut [Option<T>], hashes: &mut [u32], mut elem: T, mut hash: u32, check_dup: bool) -> bool {
    let cap = hashes.len();
    let mut index = Self::bucket(hash, cap);
    let mut dib = 0usize;
    loop {
      let next_hash = hashes[index];
      if next_hash & OCCUPIED_BIT == 0 { break; }
      let next_hash = next_hash & !OCCUPIED_BIT;
      let next_index = Self::bucket(next_hash, cap);
      let next_dib = Self::dib(index, next_index, cap);
      if check_dup && elems[index].as_ref().is_some_and(|e| e.matches(&elem)) { return false; }
      if next_dib < dib {
        hashes[index] = hash | OCCUPIED_BIT;
        let resident = elems[index].replace(elem).expect("occupied slot");
        elem = resident;
        hash = next_hash;
        dib = next_dib;
      }
      dib += 1;
      index = if index + 1 >= cap { 0 } else { index + 1 };
    }
    hashes[index] = hash | OCCUPIED_BIT;
    elems[index] = Some(elem);
    true
  }

  fn rehash(&mut self, new_cap: usize) {
    debug_assert!(new_cap.is_power_of_two());
    let mut new_elems = vec![None; new_cap];
    let mut new_hashes = vec![0u32; new_cap];
    for i in 0..self.capacity() {
      let hash = self.hashes[i];
      if hash & OCCUPIED_BIT == 0 { continue; }
      let elem = self.elems[i].expect("occupied slot");
      Self::insert_internal(&mut new_elems, &mut new_hashes, elem, hash & !OCCUPIED_BIT, false);
    }
    self.elems = new_elems;
    self.hashes = new_hashes;
  }

  /// Remove the entry equal to `key`, if present. Returns the removed
  /// entry.
  pub fn remove(&mut self, key: &T) -> Option<T> {
    let index = self.lookup(key)?;
    Some(self.remove_at(index))
  }

  /// Remove the entry occupying `index`, shifting the following probe run
  /// back by one slot to preserve the DIB invariant (backward-shift
  /// deletion — no tombstones).
  pub fn remove_at(&mut self, index: usize) -> T {
    let cap = self.capacity();
    assert!(self.hashes[index] & OCCUPIED_BIT != 0, "remove_at on empty slot");
    let removed = self.elems[index].take().expect("occupied slot");

    let prev = index;
    let mut index = index;
    loop {
      index = if index + 1 >= cap { 0 } else { index + 1 };
      let next_hash = self.hashes[index];
      if next_hash & OCCUPIED_BIT == 0 { break; }
      let next_hash = next_hash & !OCCUPIED_BIT;
      let next_index = Self::bucket(next_hash, cap);
      if Self::dib(index, next_index, cap) == 0 { break; }
    }

    if index > prev {
      for i in prev..index {
        self.hashes[i] = self.hashes[i + 1];
        self.elems[i] = self.elems[i + 1].take();
      }
    } else {
      for i in prev..cap - 1 {
        self.hashes[i] = self.hashes[i + 1];
        self.elems[i] = self.elems[i + 1].take();
      }
      if index > 0 {
        self.hashes[cap - 1] = self.hashes[0];
        self.elems[cap - 1] = self.elems[0].take();
        for i in 0..index - 1 {
          self.hashes[i] = self.hashes[i + 1];
          self.elems[i] = self.elems[i + 1].take();
        }
        index -= 1;
      } else {
        index = cap - 1;
      }
    }
    self.hashes[index] = 0;
    self.elems[index] = None;
    self.nelems -= 1;
    removed
  }

  /// Remove every entry, keeping the allocated capacity.
  pub fn clear(&mut self) {
    self.nelems = 0;
    self.hashes.iter_mut().for_each(|h| *h = 0);
    self.elems.iter_mut().for_each(|e| *e = None);
  }

  /// Iterate over the occupied entries in slot order (no particular
  /// logical order is implied — the table does not track insertion
  /// order).
  pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
    self.elems.iter().filter_map(|e| *e)
  }
}
