//! Segment encoding application and the persisted encoding tags

use std::fmt;
use std::sync::Arc;

use crate::chunk::Chunk;
use crate::error::StorageError;
use crate::segment::{
    DictionarySegment, FixedStringDictionarySegment, FrameOfReferenceSegment, RunLengthSegment,
    Segment, ValueSegment,
};

/// Persisted encoding tag of a segment (exported via the meta-tables).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodingType {
    Unencoded,
    Dictionary,
    RunLength,
    FixedStringDictionary,
    FrameOfReference,
}

impl fmt::Display for EncodingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Persisted compression tag of a compressed attribute vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorCompressionType {
    FixedSize1B,
    FixedSize2B,
    FixedSize4B,
    SimdBp128,
}

impl fmt::Display for VectorCompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Requested encoding for one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentEncodingSpec {
    pub encoding_type: EncodingType,
    pub vector_compression: Option<VectorCompressionType>,
}

impl SegmentEncodingSpec {
    pub fn new(encoding_type: EncodingType) -> Self {
        SegmentEncodingSpec { encoding_type, vector_compression: None }
    }

    pub fn with_vector_compression(
        encoding_type: EncodingType,
        vector_compression: VectorCompressionType,
    ) -> Self {
        SegmentEncodingSpec { encoding_type, vector_compression: Some(vector_compression) }
    }
}

/// Applies encodings to unencoded segments and whole chunks.
pub struct ChunkEncoder;

impl ChunkEncoder {
    /// Re-encode an unencoded segment according to `spec`.
    ///
    /// Encoding anything but a `ValueSegment` is a contract violation: chunks
    /// are encoded once, after finalization.
    pub fn encode_segment(
        segment: &Segment,
        spec: SegmentEncodingSpec,
    ) -> Result<Segment, StorageError> {
        let value_segment = match segment {
            Segment::Value(s) => s,
            _ => {
                return Err(StorageError::InvalidEncoding(
                    "only unencoded segments can be encoded".to_string(),
                ))
            }
        };
        Self::encode_value_segment(value_segment, spec)
    }

    fn encode_value_segment(
        segment: &ValueSegment,
        spec: SegmentEncodingSpec,
    ) -> Result<Segment, StorageError> {
        match spec.encoding_type {
            EncodingType::Unencoded => Ok(Segment::Value(segment.clone())),
            EncodingType::Dictionary => Ok(Segment::Dictionary(DictionarySegment::encode(
                segment,
                spec.vector_compression,
            ))),
            EncodingType::FixedStringDictionary => Ok(Segment::FixedStringDictionary(
                FixedStringDictionarySegment::encode(segment, spec.vector_compression)?,
            )),
            EncodingType::RunLength => Ok(Segment::RunLength(RunLengthSegment::encode(segment))),
            EncodingType::FrameOfReference => {
                Ok(Segment::FrameOfReference(FrameOfReferenceSegment::encode(segment)?))
            }
        }
    }

    /// Encode every column of a finalized chunk, returning the encoded chunk.
    /// `specs` must have one entry per column.
    pub fn encode_chunk(
        chunk: &Chunk,
        specs: &[SegmentEncodingSpec],
    ) -> Result<Chunk, StorageError> {
        if specs.len() != chunk.column_count() {
            return Err(StorageError::ColumnCountMismatch {
                expected: chunk.column_count(),
                actual: specs.len(),
            });
        }
        let mut segments = Vec::with_capacity(chunk.column_count());
        for (column_index, spec) in specs.iter().enumerate() {
            let segment = chunk.segments()[column_index].as_ref();
            segments.push(Arc::new(Self::encode_segment(segment, *spec)?));
        }
        let mut encoded = Chunk::new(segments)?;
        encoded.set_ordered_by(chunk.ordered_by().to_vec());
        encoded.finalize();
        Ok(encoded)
    }
}

#[cfg(test)]
mod tests {
    use strata_types::{AllTypeVariant, DataType};

    use super::*;

    fn unencoded_int_segment() -> Segment {
        Segment::Value(
            ValueSegment::from_values(
                DataType::Int32,
                false,
                vec![
                    AllTypeVariant::Int32(7),
                    AllTypeVariant::Int32(7),
                    AllTypeVariant::Int32(2),
                ],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_encode_segment_each_encoding() {
        let segment = unencoded_int_segment();
        for encoding in [
            EncodingType::Unencoded,
            EncodingType::Dictionary,
            EncodingType::RunLength,
            EncodingType::FrameOfReference,
        ] {
            let encoded =
                ChunkEncoder::encode_segment(&segment, SegmentEncodingSpec::new(encoding))
                    .unwrap();
            assert_eq!(encoded.encoding_type(), Some(encoding));
            for offset in 0..segment.len() as u32 {
                assert_eq!(encoded.get(offset), segment.get(offset));
            }
        }
    }

    #[test]
    fn test_encoding_an_encoded_segment_fails() {
        let segment = unencoded_int_segment();
        let dictionary = ChunkEncoder::encode_segment(
            &segment,
            SegmentEncodingSpec::new(EncodingType::Dictionary),
        )
        .unwrap();
        let result = ChunkEncoder::encode_segment(
            &dictionary,
            SegmentEncodingSpec::new(EncodingType::RunLength),
        );
        assert!(result.is_err());
    }
}
