//! Fixed-width string dictionary segments

use strata_types::{AllTypeVariant, ChunkOffset, DataType, ValueId};

use crate::encoding::VectorCompressionType;
use crate::error::StorageError;
use crate::segment::compressed_vector::CompressedVector;
use crate::segment::value_segment::ValueSegment;

/// A dictionary-encoded string segment whose dictionary lives in one
/// contiguous byte buffer of fixed-width slots (width = longest string).
/// Strings shorter than the slot are padded with trailing zero bytes.
///
/// Compared to `DictionarySegment` over `Vec<String>` this trades padding
/// bytes for pointer-free lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedStringDictionarySegment {
    char_buffer: Vec<u8>,
    string_length: usize,
    dictionary_size: usize,
    attribute_vector: CompressedVector,
    null_value_id: ValueId,
}

impl FixedStringDictionarySegment {
    /// Encode an unencoded string segment.
    pub fn encode(
        segment: &ValueSegment,
        vector_compression: Option<VectorCompressionType>,
    ) -> Result<Self, StorageError> {
        if segment.data_type() != DataType::String {
            return Err(StorageError::InvalidEncoding(format!(
                "FixedStringDictionary requires a string column, got {}",
                segment.data_type()
            )));
        }

        let mut distinct: Vec<String> = Vec::with_capacity(segment.len());
        for offset in 0..segment.len() as ChunkOffset {
            match segment.get(offset) {
                AllTypeVariant::String(s) => distinct.push(s),
                AllTypeVariant::Null => {}
                _ => unreachable!("string segment yields strings or NULL"),
            }
        }
        distinct.sort_unstable();
        distinct.dedup();

        let string_length = distinct.iter().map(|s| s.len()).max().unwrap_or(0);
        let mut char_buffer = vec![0u8; distinct.len() * string_length];
        for (index, string) in distinct.iter().enumerate() {
            char_buffer[index * string_length..index * string_length + string.len()]
                .copy_from_slice(string.as_bytes());
        }

        let null_value_id = ValueId(distinct.len() as u32);
        let mut attribute_values = Vec::with_capacity(segment.len());
        for offset in 0..segment.len() as ChunkOffset {
            match segment.get(offset) {
                AllTypeVariant::Null => attribute_values.push(null_value_id.0),
                AllTypeVariant::String(s) => {
                    let value_id = distinct
                        .binary_search(&s)
                        .expect("every non-NULL value is in the dictionary");
                    attribute_values.push(value_id as u32);
                }
                _ => unreachable!(),
            }
        }
        let attribute_vector = CompressedVector::compress(&attribute_values, vector_compression);

        Ok(FixedStringDictionarySegment {
            char_buffer,
            string_length,
            dictionary_size: distinct.len(),
            attribute_vector,
            null_value_id,
        })
    }

    pub fn data_type(&self) -> DataType {
        DataType::String
    }

    pub fn len(&self) -> usize {
        self.attribute_vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attribute_vector.is_empty()
    }

    pub fn unique_values_count(&self) -> usize {
        self.dictionary_size
    }

    pub fn null_value_id(&self) -> ValueId {
        self.null_value_id
    }

    pub fn attribute_vector(&self) -> &CompressedVector {
        &self.attribute_vector
    }

    pub fn value_id_at(&self, offset: ChunkOffset) -> ValueId {
        self.attribute_vector.value_id(offset as usize)
    }

    /// Dictionary entry without the zero padding.
    fn dictionary_entry(&self, index: usize) -> &str {
        let slot = &self.char_buffer[index * self.string_length..(index + 1) * self.string_length];
        let end = slot.iter().position(|&b| b == 0).unwrap_or(self.string_length);
        // The buffer was written from valid UTF-8 strings.
        std::str::from_utf8(&slot[..end]).expect("dictionary holds UTF-8")
    }

    fn probe_str<'a>(value: &'a AllTypeVariant) -> Option<&'a str> {
        match value {
            AllTypeVariant::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Binary search over the buffer slots; `inclusive` makes it an upper
    /// bound.
    fn bound(&self, probe: &str, inclusive: bool) -> usize {
        let mut low = 0;
        let mut high = self.dictionary_size;
        while low < high {
            let mid = (low + high) / 2;
            let entry = self.dictionary_entry(mid);
            let descend_right = if inclusive { entry <= probe } else { entry < probe };
            if descend_right {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        low
    }

    pub fn lower_bound_value_id(&self, value: &AllTypeVariant) -> Option<ValueId> {
        let probe = Self::probe_str(value)?;
        Some(ValueId(self.bound(probe, false) as u32))
    }

    pub fn upper_bound_value_id(&self, value: &AllTypeVariant) -> Option<ValueId> {
        let probe = Self::probe_str(value)?;
        Some(ValueId(self.bound(probe, true) as u32))
    }

    pub fn value_of_value_id(&self, value_id: ValueId) -> AllTypeVariant {
        if value_id == self.null_value_id {
            AllTypeVariant::Null
        } else {
            AllTypeVariant::String(self.dictionary_entry(value_id.as_usize()).to_string())
        }
    }

    pub fn is_null_at(&self, offset: ChunkOffset) -> bool {
        self.value_id_at(offset) == self.null_value_id
    }

    pub fn get(&self, offset: ChunkOffset) -> AllTypeVariant {
        self.value_of_value_id(self.value_id_at(offset))
    }

    pub fn estimate_memory_usage(&self) -> usize {
        self.char_buffer.capacity() + self.attribute_vector.estimate_memory_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_segment(values: &[Option<&str>]) -> ValueSegment {
        let variants = values
            .iter()
            .map(|v| v.map_or(AllTypeVariant::Null, |s| AllTypeVariant::String(s.to_string())))
            .collect();
        ValueSegment::from_values(DataType::String, true, variants).unwrap()
    }

    #[test]
    fn test_round_trip_with_padding() {
        let segment = string_segment(&[Some("bb"), Some("a"), None, Some("ccc"), Some("a")]);
        let encoded = FixedStringDictionarySegment::encode(&segment, None).unwrap();

        assert_eq!(encoded.unique_values_count(), 3);
        for offset in 0..segment.len() as ChunkOffset {
            assert_eq!(encoded.get(offset), segment.get(offset), "offset {}", offset);
        }
    }

    #[test]
    fn test_bounds_match_sorted_dictionary() {
        let segment = string_segment(&[Some("apple"), Some("pear"), Some("fig")]);
        let encoded = FixedStringDictionarySegment::encode(&segment, None).unwrap();

        assert_eq!(
            encoded.lower_bound_value_id(&AllTypeVariant::String("fig".into())),
            Some(ValueId(1))
        );
        assert_eq!(
            encoded.upper_bound_value_id(&AllTypeVariant::String("fig".into())),
            Some(ValueId(2))
        );
    }

    #[test]
    fn test_rejects_non_string_column() {
        let segment =
            ValueSegment::from_values(DataType::Int32, false, vec![AllTypeVariant::Int32(1)])
                .unwrap();
        assert!(FixedStringDictionarySegment::encode(&segment, None).is_err());
    }
}
