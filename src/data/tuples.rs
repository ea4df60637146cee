//! Tuple collections.
//!
//! The engine reads tuples one at a time through [`TupleList::get_tuple`], so any
//! backing store with O(1) random access works. [`ArrayTupleList`] is the
//! in-memory implementation; [`TupleSubset`] is a read-only view used when an
//! algorithm needs to re-cluster part of a collection it does not own.

use std::collections::HashSet;

use crate::error::{Error, Result};

/// Read access to a collection of equal-length tuples.
pub trait TupleList: Send + Sync {
    /// Number of tuples.
    fn tuple_count(&self) -> usize;

    /// Length of every tuple.
    fn tuple_length(&self) -> usize;

    /// Copy tuple `index` into `dest` (which must be `tuple_length()` long).
    ///
    /// # Panics
    ///
    /// Panics if `index >= tuple_count()` or `dest` has the wrong length.
    fn get_tuple(&self, index: usize, dest: &mut [f64]);

    /// Single element of tuple `index`.
    fn value(&self, index: usize, column: usize) -> f64 {
        let mut buf = vec![0.0; self.tuple_length()];
        self.get_tuple(index, &mut buf);
        buf[column]
    }
}

/// Write access to a tuple collection.
pub trait TupleListMut: TupleList {
    /// Overwrite tuple `index` with `values`.
    fn set_tuple(&mut self, index: usize, values: &[f64]) -> Result<()>;
}

/// Dense, row-major, in-memory tuple collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayTupleList {
    length: usize,
    data: Vec<f64>,
}

impl ArrayTupleList {
    /// `count` zero tuples of length `length`.
    pub fn new(count: usize, length: usize) -> Self {
        Self {
            length,
            data: vec![0.0; count * length],
        }
    }

    /// Build from rows; every row must have the same length.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
        let length = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * length);
        for row in rows {
            let row = row.as_ref();
            if row.len() != length {
                return Err(Error::DimensionMismatch {
                    expected: length,
                    found: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self { length, data })
    }

    /// Build from a row-major buffer.
    pub fn from_flat(length: usize, data: Vec<f64>) -> Result<Self> {
        if length == 0 {
            if !data.is_empty() {
                return Err(Error::invalid("length", "must be at least 1 for non-empty data"));
            }
        } else if data.len() % length != 0 {
            return Err(Error::DimensionMismatch {
                expected: length,
                found: data.len() % length,
            });
        }
        Ok(Self { length, data })
    }

    /// Copy any tuple list into memory.
    pub fn copy_of(tuples: &dyn TupleList) -> Self {
        let length = tuples.tuple_length();
        let mut out = Self::new(tuples.tuple_count(), length);
        for i in 0..tuples.tuple_count() {
            tuples.get_tuple(i, &mut out.data[i * length..(i + 1) * length]);
        }
        out
    }

    /// Borrow tuple `index`.
    pub fn row(&self, index: usize) -> &[f64] {
        &self.data[index * self.length..(index + 1) * self.length]
    }

    /// Iterate over rows in index order.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        // chunks_exact panics on 0; an empty iterator is the right answer there.
        let chunk = self.length.max(1);
        self.data.chunks_exact(chunk).take(self.len())
    }

    /// Number of tuples.
    pub fn len(&self) -> usize {
        if self.length == 0 {
            0
        } else {
            self.data.len() / self.length
        }
    }

    /// True when there are no tuples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row-major backing buffer.
    pub fn as_flat(&self) -> &[f64] {
        &self.data
    }

    pub(crate) fn into_flat(self) -> Vec<f64> {
        self.data
    }
}

impl TupleList for ArrayTupleList {
    fn tuple_count(&self) -> usize {
        self.len()
    }

    fn tuple_length(&self) -> usize {
        self.length
    }

    fn get_tuple(&self, index: usize, dest: &mut [f64]) {
        dest.copy_from_slice(self.row(index));
    }

    fn value(&self, index: usize, column: usize) -> f64 {
        self.data[index * self.length + column]
    }
}

impl TupleListMut for ArrayTupleList {
    fn set_tuple(&mut self, index: usize, values: &[f64]) -> Result<()> {
        if index >= self.len() {
            return Err(Error::IndexOutOfBounds {
                index,
                len: self.len(),
            });
        }
        if values.len() != self.length {
            return Err(Error::DimensionMismatch {
                expected: self.length,
                found: values.len(),
            });
        }
        self.data[index * self.length..(index + 1) * self.length].copy_from_slice(values);
        Ok(())
    }
}

/// Read-only view of `parent` restricted to `indices`.
///
/// Local index `i` of the view is tuple `indices[i]` of the parent.
#[derive(Clone, Copy)]
pub struct TupleSubset<'a> {
    parent: &'a dyn TupleList,
    indices: &'a [usize],
}

impl<'a> TupleSubset<'a> {
    /// Create a view; every index must be in range for `parent`.
    pub fn new(parent: &'a dyn TupleList, indices: &'a [usize]) -> Result<Self> {
        let len = parent.tuple_count();
        if let Some(&index) = indices.iter().find(|&&i| i >= len) {
            return Err(Error::IndexOutOfBounds { index, len });
        }
        Ok(Self { parent, indices })
    }

    /// Parent index of local tuple `local`.
    pub fn parent_index(&self, local: usize) -> usize {
        self.indices[local]
    }

    /// All parent indices, in view order.
    pub fn indices(&self) -> &'a [usize] {
        self.indices
    }
}

impl TupleList for TupleSubset<'_> {
    fn tuple_count(&self) -> usize {
        self.indices.len()
    }

    fn tuple_length(&self) -> usize {
        self.parent.tuple_length()
    }

    fn get_tuple(&self, index: usize, dest: &mut [f64]) {
        self.parent.get_tuple(self.indices[index], dest);
    }

    fn value(&self, index: usize, column: usize) -> f64 {
        self.parent.value(self.indices[index], column)
    }
}

/// Number of bitwise-distinct tuples.
pub fn unique_tuple_count(tuples: &dyn TupleList) -> usize {
    let mut buf = vec![0.0; tuples.tuple_length()];
    let mut seen: HashSet<Vec<u64>> = HashSet::with_capacity(tuples.tuple_count());
    for i in 0..tuples.tuple_count() {
        tuples.get_tuple(i, &mut buf);
        seen.insert(buf.iter().map(|v| canonical_bits(*v)).collect());
    }
    seen.len()
}

// -0.0 and 0.0 compare equal, so they must hash equal too.
pub(crate) fn canonical_bits(v: f64) -> u64 {
    if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}
