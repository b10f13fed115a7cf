//! Typed value vectors backing the segment encodings
//!
//! Segments store their payload as one densely typed vector per column
//! (values, dictionary entries or run values) instead of a vector of variant
//! values. `TypedValues` is that payload: a tagged enum over the five column
//! types with the accessors the encodings need.

use std::cmp::Ordering;
use std::mem;

use strata_types::{AllTypeVariant, DataType};

use crate::error::StorageError;

/// A densely typed vector of non-NULL values of one column data type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValues {
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    String(Vec<String>),
}

impl TypedValues {
    /// Create an empty vector for the given column data type.
    ///
    /// Panics on `DataType::Null`; columns are never of type Null.
    pub fn new(data_type: DataType) -> Self {
        match data_type {
            DataType::Int32 => TypedValues::Int32(Vec::new()),
            DataType::Int64 => TypedValues::Int64(Vec::new()),
            DataType::Float => TypedValues::Float(Vec::new()),
            DataType::Double => TypedValues::Double(Vec::new()),
            DataType::String => TypedValues::String(Vec::new()),
            DataType::Null => panic!("columns cannot be of type Null"),
        }
    }

    pub fn with_capacity(data_type: DataType, capacity: usize) -> Self {
        let mut values = Self::new(data_type);
        values.reserve(capacity);
        values
    }

    pub fn data_type(&self) -> DataType {
        match self {
            TypedValues::Int32(_) => DataType::Int32,
            TypedValues::Int64(_) => DataType::Int64,
            TypedValues::Float(_) => DataType::Float,
            TypedValues::Double(_) => DataType::Double,
            TypedValues::String(_) => DataType::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TypedValues::Int32(values) => values.len(),
            TypedValues::Int64(values) => values.len(),
            TypedValues::Float(values) => values.len(),
            TypedValues::Double(values) => values.len(),
            TypedValues::String(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn reserve(&mut self, additional: usize) {
        match self {
            TypedValues::Int32(values) => values.reserve(additional),
            TypedValues::Int64(values) => values.reserve(additional),
            TypedValues::Float(values) => values.reserve(additional),
            TypedValues::Double(values) => values.reserve(additional),
            TypedValues::String(values) => values.reserve(additional),
        }
    }

    /// Append a non-NULL value of the matching type.
    pub fn push(&mut self, value: AllTypeVariant) -> Result<(), StorageError> {
        match (self, value) {
            (TypedValues::Int32(values), AllTypeVariant::Int32(v)) => values.push(v),
            (TypedValues::Int64(values), AllTypeVariant::Int64(v)) => values.push(v),
            (TypedValues::Float(values), AllTypeVariant::Float(v)) => values.push(v),
            (TypedValues::Double(values), AllTypeVariant::Double(v)) => values.push(v),
            (TypedValues::String(values), AllTypeVariant::String(v)) => values.push(v),
            (this, value) => {
                return Err(StorageError::TypeMismatch {
                    column: String::new(),
                    expected: this.data_type(),
                    actual: value.data_type(),
                })
            }
        }
        Ok(())
    }

    /// Append the type's default value; placeholder slot behind a null flag.
    pub fn push_default(&mut self) {
        match self {
            TypedValues::Int32(values) => values.push(0),
            TypedValues::Int64(values) => values.push(0),
            TypedValues::Float(values) => values.push(0.0),
            TypedValues::Double(values) => values.push(0.0),
            TypedValues::String(values) => values.push(String::new()),
        }
    }

    pub fn get(&self, index: usize) -> AllTypeVariant {
        match self {
            TypedValues::Int32(values) => AllTypeVariant::Int32(values[index]),
            TypedValues::Int64(values) => AllTypeVariant::Int64(values[index]),
            TypedValues::Float(values) => AllTypeVariant::Float(values[index]),
            TypedValues::Double(values) => AllTypeVariant::Double(values[index]),
            TypedValues::String(values) => AllTypeVariant::String(values[index].clone()),
        }
    }

    /// Sort ascending and drop duplicates. Consumes self; used to build
    /// dictionaries.
    pub fn sorted_dedup(mut self) -> Self {
        match &mut self {
            TypedValues::Int32(values) => {
                values.sort_unstable();
                values.dedup();
            }
            TypedValues::Int64(values) => {
                values.sort_unstable();
                values.dedup();
            }
            TypedValues::Float(values) => {
                values.sort_unstable_by(|a, b| a.total_cmp(b));
                values.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
            }
            TypedValues::Double(values) => {
                values.sort_unstable_by(|a, b| a.total_cmp(b));
                values.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
            }
            TypedValues::String(values) => {
                values.sort_unstable();
                values.dedup();
            }
        }
        self
    }

    /// Whether the vector is strictly increasing (the dictionary invariant).
    pub fn is_strictly_increasing(&self) -> bool {
        fn check<T, F: Fn(&T, &T) -> Ordering>(values: &[T], cmp: F) -> bool {
            values.windows(2).all(|w| cmp(&w[0], &w[1]) == Ordering::Less)
        }
        match self {
            TypedValues::Int32(values) => check(values, |a, b| a.cmp(b)),
            TypedValues::Int64(values) => check(values, |a, b| a.cmp(b)),
            TypedValues::Float(values) => check(values, |a, b| a.total_cmp(b)),
            TypedValues::Double(values) => check(values, |a, b| a.total_cmp(b)),
            TypedValues::String(values) => check(values, |a, b| a.cmp(b)),
        }
    }

    /// First index whose value is >= `value`, assuming the vector is sorted.
    ///
    /// Returns `None` when the probe value cannot be compared against this
    /// vector's type (callers coerce the probe first).
    pub fn lower_bound(&self, value: &AllTypeVariant) -> Option<usize> {
        match (self, value) {
            (TypedValues::Int32(values), AllTypeVariant::Int32(v)) => {
                Some(values.partition_point(|x| x < v))
            }
            (TypedValues::Int64(values), AllTypeVariant::Int64(v)) => {
                Some(values.partition_point(|x| x < v))
            }
            (TypedValues::Float(values), AllTypeVariant::Float(v)) => {
                Some(values.partition_point(|x| x.total_cmp(v) == Ordering::Less))
            }
            (TypedValues::Double(values), AllTypeVariant::Double(v)) => {
                Some(values.partition_point(|x| x.total_cmp(v) == Ordering::Less))
            }
            (TypedValues::String(values), AllTypeVariant::String(v)) => {
                Some(values.partition_point(|x| x < v))
            }
            _ => None,
        }
    }

    /// First index whose value is > `value`, assuming the vector is sorted.
    pub fn upper_bound(&self, value: &AllTypeVariant) -> Option<usize> {
        match (self, value) {
            (TypedValues::Int32(values), AllTypeVariant::Int32(v)) => {
                Some(values.partition_point(|x| x <= v))
            }
            (TypedValues::Int64(values), AllTypeVariant::Int64(v)) => {
                Some(values.partition_point(|x| x <= v))
            }
            (TypedValues::Float(values), AllTypeVariant::Float(v)) => {
                Some(values.partition_point(|x| x.total_cmp(v) != Ordering::Greater))
            }
            (TypedValues::Double(values), AllTypeVariant::Double(v)) => {
                Some(values.partition_point(|x| x.total_cmp(v) != Ordering::Greater))
            }
            (TypedValues::String(values), AllTypeVariant::String(v)) => {
                Some(values.partition_point(|x| x <= v))
            }
            _ => None,
        }
    }

    /// Heap size estimate in bytes.
    pub fn estimate_memory_usage(&self) -> usize {
        match self {
            TypedValues::Int32(values) => values.capacity() * mem::size_of::<i32>(),
            TypedValues::Int64(values) => values.capacity() * mem::size_of::<i64>(),
            TypedValues::Float(values) => values.capacity() * mem::size_of::<f32>(),
            TypedValues::Double(values) => values.capacity() * mem::size_of::<f64>(),
            TypedValues::String(values) => {
                values.capacity() * mem::size_of::<String>()
                    + values.iter().map(|s| s.capacity()).sum::<usize>()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_get_round_trip() {
        let mut values = TypedValues::new(DataType::Int64);
        values.push(AllTypeVariant::Int64(3)).unwrap();
        values.push(AllTypeVariant::Int64(-7)).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values.get(1), AllTypeVariant::Int64(-7));
    }

    #[test]
    fn test_push_rejects_wrong_type() {
        let mut values = TypedValues::new(DataType::Int32);
        let result = values.push(AllTypeVariant::String("nope".into()));
        assert!(result.is_err());
    }

    #[test]
    fn test_sorted_dedup_is_strictly_increasing() {
        let mut values = TypedValues::new(DataType::Int32);
        for v in [5, 1, 5, 3, 1] {
            values.push(AllTypeVariant::Int32(v)).unwrap();
        }
        let sorted = values.sorted_dedup();
        assert_eq!(sorted.len(), 3);
        assert!(sorted.is_strictly_increasing());
        assert_eq!(sorted.get(0), AllTypeVariant::Int32(1));
        assert_eq!(sorted.get(2), AllTypeVariant::Int32(5));
    }

    #[test]
    fn test_bounds_on_sorted_values() {
        let mut values = TypedValues::new(DataType::Int32);
        for v in [1, 3, 3, 7] {
            values.push(AllTypeVariant::Int32(v)).unwrap();
        }
        assert_eq!(values.lower_bound(&AllTypeVariant::Int32(3)), Some(1));
        assert_eq!(values.upper_bound(&AllTypeVariant::Int32(3)), Some(3));
        assert_eq!(values.lower_bound(&AllTypeVariant::Int32(8)), Some(4));
        assert_eq!(values.lower_bound(&AllTypeVariant::Int64(3)), None);
    }
}
