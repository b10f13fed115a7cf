//! Dictionary-encoded segments

use strata_types::{AllTypeVariant, ChunkOffset, DataType, ValueId};

use crate::encoding::VectorCompressionType;
use crate::segment::compressed_vector::CompressedVector;
use crate::segment::value_segment::ValueSegment;
use crate::typed_values::TypedValues;

/// A dictionary-encoded column fragment: a sorted dictionary of the distinct
/// non-NULL values and a compressed attribute vector of dictionary indices.
///
/// The value id one past the dictionary (== dictionary length) is reserved as
/// the NULL sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct DictionarySegment {
    dictionary: TypedValues,
    attribute_vector: CompressedVector,
    null_value_id: ValueId,
}

impl DictionarySegment {
    /// Encode an unencoded segment.
    pub fn encode(
        segment: &ValueSegment,
        vector_compression: Option<VectorCompressionType>,
    ) -> Self {
        let mut distinct = TypedValues::with_capacity(segment.data_type(), segment.len());
        for offset in 0..segment.len() as ChunkOffset {
            let value = segment.get(offset);
            if !value.is_null() {
                // push cannot fail: the value came out of a same-typed segment
                distinct.push(value).expect("value type matches segment type");
            }
        }
        let dictionary = distinct.sorted_dedup();
        let null_value_id = ValueId(dictionary.len() as u32);

        let mut attribute_values = Vec::with_capacity(segment.len());
        for offset in 0..segment.len() as ChunkOffset {
            let value = segment.get(offset);
            if value.is_null() {
                attribute_values.push(null_value_id.0);
            } else {
                let value_id = dictionary
                    .lower_bound(&value)
                    .expect("dictionary type matches segment type");
                attribute_values.push(value_id as u32);
            }
        }

        // The null sentinel must be representable in the fixed-size width.
        let attribute_vector = CompressedVector::compress(&attribute_values, vector_compression);

        DictionarySegment { dictionary, attribute_vector, null_value_id }
    }

    pub fn data_type(&self) -> DataType {
        self.dictionary.data_type()
    }

    pub fn len(&self) -> usize {
        self.attribute_vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attribute_vector.is_empty()
    }

    /// The sorted, strictly increasing dictionary.
    pub fn dictionary(&self) -> &TypedValues {
        &self.dictionary
    }

    pub fn unique_values_count(&self) -> usize {
        self.dictionary.len()
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

    /// Smallest value id whose dictionary value is >= `value`; the dictionary
    /// length if no such value exists. `None` if the probe type mismatches.
    pub fn lower_bound_value_id(&self, value: &AllTypeVariant) -> Option<ValueId> {
        self.dictionary.lower_bound(value).map(|index| ValueId(index as u32))
    }

    /// Smallest value id whose dictionary value is > `value`.
    pub fn upper_bound_value_id(&self, value: &AllTypeVariant) -> Option<ValueId> {
        self.dictionary.upper_bound(value).map(|index| ValueId(index as u32))
    }

    pub fn value_of_value_id(&self, value_id: ValueId) -> AllTypeVariant {
        if value_id == self.null_value_id {
            AllTypeVariant::Null
        } else {
            self.dictionary.get(value_id.as_usize())
        }
    }

    pub fn is_null_at(&self, offset: ChunkOffset) -> bool {
        self.value_id_at(offset) == self.null_value_id
    }

    pub fn get(&self, offset: ChunkOffset) -> AllTypeVariant {
        self.value_of_value_id(self.value_id_at(offset))
    }

    pub fn estimate_memory_usage(&self) -> usize {
        self.dictionary.estimate_memory_usage() + self.attribute_vector.estimate_memory_usage()
    }
}
