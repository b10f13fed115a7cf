//! Unencoded segments: dense typed values plus an optional null vector

use strata_types::{AllTypeVariant, ChunkOffset, DataType};

use crate::error::StorageError;
use crate::typed_values::TypedValues;

/// An unencoded column fragment: dense values and, for nullable columns, a
/// parallel null vector. NULL slots hold the type's default value.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSegment {
    values: TypedValues,
    nulls: Option<Vec<bool>>,
}

impl ValueSegment {
    pub fn new(data_type: DataType, nullable: bool) -> Self {
        ValueSegment {
            values: TypedValues::new(data_type),
            nulls: if nullable { Some(Vec::new()) } else { None },
        }
    }

    /// Build a segment from variant values; the segment is nullable iff a
    /// null vector is wanted by the caller.
    pub fn from_values(
        data_type: DataType,
        nullable: bool,
        values: Vec<AllTypeVariant>,
    ) -> Result<Self, StorageError> {
        let mut segment = ValueSegment::new(data_type, nullable);
        for value in values {
            segment.append(value)?;
        }
        Ok(segment)
    }

    pub fn data_type(&self) -> DataType {
        self.values.data_type()
    }

    pub fn is_nullable(&self) -> bool {
        self.nulls.is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Append a value or NULL. Appending NULL to a non-nullable segment is an
    /// error.
    pub fn append(&mut self, value: AllTypeVariant) -> Result<(), StorageError> {
        if value.is_null() {
            match &mut self.nulls {
                Some(nulls) => {
                    nulls.push(true);
                    self.values.push_default();
                    Ok(())
                }
                None => Err(StorageError::NullConstraintViolation { column: String::new() }),
            }
        } else {
            self.values.push(value)?;
            if let Some(nulls) = &mut self.nulls {
                nulls.push(false);
            }
            Ok(())
        }
    }

    pub fn is_null_at(&self, offset: ChunkOffset) -> bool {
        self.nulls.as_ref().map_or(false, |nulls| nulls[offset as usize])
    }

    pub fn get(&self, offset: ChunkOffset) -> AllTypeVariant {
        if self.is_null_at(offset) {
            AllTypeVariant::Null
        } else {
            self.values.get(offset as usize)
        }
    }

    pub(crate) fn typed_values(&self) -> &TypedValues {
        &self.values
    }

    pub(crate) fn null_vector(&self) -> Option<&[bool]> {
        self.nulls.as_deref()
    }

    pub fn estimate_memory_usage(&self) -> usize {
        self.values.estimate_memory_usage()
            + self.nulls.as_ref().map_or(0, |nulls| nulls.capacity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_get() {
        let mut segment = ValueSegment::new(DataType::Int32, true);
        segment.append(AllTypeVariant::Int32(1)).unwrap();
        segment.append(AllTypeVariant::Null).unwrap();
        segment.append(AllTypeVariant::Int32(3)).unwrap();

        assert_eq!(segment.len(), 3);
        assert_eq!(segment.get(0), AllTypeVariant::Int32(1));
        assert_eq!(segment.get(1), AllTypeVariant::Null);
        assert!(segment.is_null_at(1));
        assert_eq!(segment.get(2), AllTypeVariant::Int32(3));
    }

    #[test]
    fn test_null_into_non_nullable_fails() {
        let mut segment = ValueSegment::new(DataType::String, false);
        assert!(segment.append(AllTypeVariant::Null).is_err());
        segment.append(AllTypeVariant::String("ok".into())).unwrap();
        assert_eq!(segment.len(), 1);
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut segment = ValueSegment::new(DataType::Int32, false);
        assert!(segment.append(AllTypeVariant::Int64(1)).is_err());
    }
}
