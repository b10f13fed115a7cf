//! Segment variants and the uniform access surface over them
//!
//! A segment is one column's values for one chunk, stored in a particular
//! encoding. Polymorphism over encodings is expressed as a tagged enum;
//! iteration is specialized per variant.

mod compressed_vector;
mod dictionary_segment;
mod fixed_string_dictionary_segment;
mod frame_of_reference_segment;
mod reference_segment;
mod run_length_segment;
mod value_segment;

pub use compressed_vector::{BitPackedVector, CompressedVector};
pub use dictionary_segment::DictionarySegment;
pub use fixed_string_dictionary_segment::FixedStringDictionarySegment;
pub use frame_of_reference_segment::FrameOfReferenceSegment;
pub use reference_segment::ReferenceSegment;
pub use run_length_segment::RunLengthSegment;
pub use value_segment::ValueSegment;

use strata_types::{AllTypeVariant, ChunkOffset, DataType, ValueId};

use crate::encoding::{EncodingType, VectorCompressionType};

/// A column fragment in one of the supported encodings.
#[derive(Debug, Clone)]
pub enum Segment {
    Value(ValueSegment),
    Dictionary(DictionarySegment),
    FixedStringDictionary(FixedStringDictionarySegment),
    RunLength(RunLengthSegment),
    FrameOfReference(FrameOfReferenceSegment),
    Reference(ReferenceSegment),
}

impl Segment {
    pub fn data_type(&self) -> DataType {
        match self {
            Segment::Value(s) => s.data_type(),
            Segment::Dictionary(s) => s.data_type(),
            Segment::FixedStringDictionary(s) => s.data_type(),
            Segment::RunLength(s) => s.data_type(),
            Segment::FrameOfReference(s) => s.data_type(),
            Segment::Reference(s) => s.data_type(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Segment::Value(s) => s.len(),
            Segment::Dictionary(s) => s.len(),
            Segment::FixedStringDictionary(s) => s.len(),
            Segment::RunLength(s) => s.len(),
            Segment::FrameOfReference(s) => s.len(),
            Segment::Reference(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The persisted encoding tag; `None` for reference segments, which are
    /// an execution artifact rather than a storage encoding.
    pub fn encoding_type(&self) -> Option<EncodingType> {
        match self {
            Segment::Value(_) => Some(EncodingType::Unencoded),
            Segment::Dictionary(_) => Some(EncodingType::Dictionary),
            Segment::FixedStringDictionary(_) => Some(EncodingType::FixedStringDictionary),
            Segment::RunLength(_) => Some(EncodingType::RunLength),
            Segment::FrameOfReference(_) => Some(EncodingType::FrameOfReference),
            Segment::Reference(_) => None,
        }
    }

    /// The attribute vector compression, for dictionary-family encodings.
    pub fn vector_compression_type(&self) -> Option<VectorCompressionType> {
        match self {
            Segment::Dictionary(s) => Some(s.attribute_vector().compression_type()),
            Segment::FixedStringDictionary(s) => Some(s.attribute_vector().compression_type()),
            _ => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Segment::Reference(_))
    }

    pub fn as_reference(&self) -> Option<&ReferenceSegment> {
        match self {
            Segment::Reference(s) => Some(s),
            _ => None,
        }
    }

    /// Uniform view over the two dictionary encodings, for scans that operate
    /// on value ids. Callers receive `None` for non-dictionary segments and
    /// fall back to generic iteration.
    pub fn as_dictionary(&self) -> Option<DictionaryView<'_>> {
        match self {
            Segment::Dictionary(s) => Some(DictionaryView::Plain(s)),
            Segment::FixedStringDictionary(s) => Some(DictionaryView::FixedString(s)),
            _ => None,
        }
    }

    pub fn is_null_at(&self, offset: ChunkOffset) -> bool {
        match self {
            Segment::Value(s) => s.is_null_at(offset),
            Segment::Dictionary(s) => s.is_null_at(offset),
            Segment::FixedStringDictionary(s) => s.is_null_at(offset),
            Segment::RunLength(s) => s.is_null_at(offset),
            Segment::FrameOfReference(s) => s.is_null_at(offset),
            Segment::Reference(s) => s.is_null_at(offset),
        }
    }

    pub fn get(&self, offset: ChunkOffset) -> AllTypeVariant {
        match self {
            Segment::Value(s) => s.get(offset),
            Segment::Dictionary(s) => s.get(offset),
            Segment::FixedStringDictionary(s) => s.get(offset),
            Segment::RunLength(s) => s.get(offset),
            Segment::FrameOfReference(s) => s.get(offset),
            Segment::Reference(s) => s.get(offset),
        }
    }

    /// Iterate `(chunk_offset, value)` positions.
    ///
    /// Without a filter, positions are visited in chunk-offset order over the
    /// whole segment; with a filter, in filter order with the filter's
    /// offsets. NULL positions yield `AllTypeVariant::Null`.
    pub fn for_each<F: FnMut(ChunkOffset, AllTypeVariant)>(
        &self,
        position_filter: Option<&[ChunkOffset]>,
        mut f: F,
    ) {
        match position_filter {
            Some(filter) => {
                for &offset in filter {
                    f(offset, self.get(offset));
                }
            }
            None => match self {
                // Run-length segments iterate runs instead of binary-searching
                // per offset.
                Segment::RunLength(s) => s.for_each(f),
                _ => {
                    for offset in 0..self.len() as ChunkOffset {
                        f(offset, self.get(offset));
                    }
                }
            },
        }
    }

    pub fn estimate_memory_usage(&self) -> usize {
        match self {
            Segment::Value(s) => s.estimate_memory_usage(),
            Segment::Dictionary(s) => s.estimate_memory_usage(),
            Segment::FixedStringDictionary(s) => s.estimate_memory_usage(),
            Segment::RunLength(s) => s.estimate_memory_usage(),
            Segment::FrameOfReference(s) => s.estimate_memory_usage(),
            Segment::Reference(s) => s.estimate_memory_usage(),
        }
    }
}

/// Value-id-level access shared by `Dictionary` and `FixedStringDictionary`
/// segments.
#[derive(Debug, Clone, Copy)]
pub enum DictionaryView<'a> {
    Plain(&'a DictionarySegment),
    FixedString(&'a FixedStringDictionarySegment),
}

impl<'a> DictionaryView<'a> {
    pub fn unique_values_count(&self) -> usize {
        match self {
            DictionaryView::Plain(s) => s.unique_values_count(),
            DictionaryView::FixedString(s) => s.unique_values_count(),
        }
    }

    pub fn null_value_id(&self) -> ValueId {
        match self {
            DictionaryView::Plain(s) => s.null_value_id(),
            DictionaryView::FixedString(s) => s.null_value_id(),
        }
    }

    pub fn value_id_at(&self, offset: ChunkOffset) -> ValueId {
        match self {
            DictionaryView::Plain(s) => s.value_id_at(offset),
            DictionaryView::FixedString(s) => s.value_id_at(offset),
        }
    }

    pub fn lower_bound_value_id(&self, value: &AllTypeVariant) -> Option<ValueId> {
        match self {
            DictionaryView::Plain(s) => s.lower_bound_value_id(value),
            DictionaryView::FixedString(s) => s.lower_bound_value_id(value),
        }
    }

    pub fn upper_bound_value_id(&self, value: &AllTypeVariant) -> Option<ValueId> {
        match self {
            DictionaryView::Plain(s) => s.upper_bound_value_id(value),
            DictionaryView::FixedString(s) => s.upper_bound_value_id(value),
        }
    }

    /// Whether `value` occurs in the dictionary. Used for the `=`/`!=` early
    /// outs.
    pub fn contains(&self, value: &AllTypeVariant) -> bool {
        match (self.lower_bound_value_id(value), self.upper_bound_value_id(value)) {
            (Some(lower), Some(upper)) => lower != upper,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use strata_types::DataType;

    use super::*;

    #[test]
    fn test_for_each_full_scan_order() {
        let values = vec![
            AllTypeVariant::Int32(3),
            AllTypeVariant::Null,
            AllTypeVariant::Int32(1),
        ];
        let segment = Segment::Value(
            ValueSegment::from_values(DataType::Int32, true, values.clone()).unwrap(),
        );

        let mut seen = Vec::new();
        segment.for_each(None, |offset, value| seen.push((offset, value)));
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], (0, AllTypeVariant::Int32(3)));
        assert_eq!(seen[1], (1, AllTypeVariant::Null));
    }

    #[test]
    fn test_for_each_respects_filter_order() {
        let values =
            (0..5).map(AllTypeVariant::Int32).collect::<Vec<_>>();
        let segment =
            Segment::Value(ValueSegment::from_values(DataType::Int32, false, values).unwrap());

        let mut seen = Vec::new();
        segment.for_each(Some(&[4, 0, 2]), |offset, value| seen.push((offset, value)));
        assert_eq!(
            seen,
            vec![
                (4, AllTypeVariant::Int32(4)),
                (0, AllTypeVariant::Int32(0)),
                (2, AllTypeVariant::Int32(2)),
            ]
        );
    }

    #[test]
    fn test_dictionary_view_contains() {
        let segment = ValueSegment::from_values(
            DataType::Int32,
            false,
            vec![AllTypeVariant::Int32(1), AllTypeVariant::Int32(5)],
        )
        .unwrap();
        let encoded = Segment::Dictionary(DictionarySegment::encode(&segment, None));
        let view = encoded.as_dictionary().unwrap();
        assert!(view.contains(&AllTypeVariant::Int32(5)));
        assert!(!view.contains(&AllTypeVariant::Int32(3)));
    }
}
