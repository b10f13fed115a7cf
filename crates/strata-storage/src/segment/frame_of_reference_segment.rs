//! Frame-of-reference-encoded segments

use strata_types::{AllTypeVariant, ChunkOffset, DataType};

use crate::error::StorageError;
use crate::segment::compressed_vector::CompressedVector;
use crate::segment::value_segment::ValueSegment;

/// Values per frame.
const BLOCK_SIZE: usize = 2048;

/// A frame-of-reference-encoded integer column fragment: per 2048-value block
/// the minimum value ("frame") plus compressed unsigned offsets from it.
/// NULL slots store offset 0 behind the null vector.
///
/// Only Int32 and Int64 columns can be FoR-encoded; a block whose value range
/// exceeds u32 cannot (the encoder reports an error and callers fall back to
/// another encoding).
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOfReferenceSegment {
    Int32 { block_minima: Vec<i32>, offsets: CompressedVector, nulls: Option<Vec<bool>> },
    Int64 { block_minima: Vec<i64>, offsets: CompressedVector, nulls: Option<Vec<bool>> },
}

impl FrameOfReferenceSegment {
    /// Encode an unencoded segment.
    pub fn encode(segment: &ValueSegment) -> Result<Self, StorageError> {
        match segment.data_type() {
            DataType::Int32 => Self::encode_int32(segment),
            DataType::Int64 => Self::encode_int64(segment),
            other => Err(StorageError::InvalidEncoding(format!(
                "FrameOfReference requires an integer column, got {}",
                other
            ))),
        }
    }

    fn encode_int32(segment: &ValueSegment) -> Result<Self, StorageError> {
        let mut raw: Vec<i64> = Vec::with_capacity(segment.len());
        let mut nulls: Vec<bool> = Vec::with_capacity(segment.len());
        let mut any_null = false;
        for offset in 0..segment.len() as ChunkOffset {
            match segment.get(offset) {
                AllTypeVariant::Int32(v) => {
                    raw.push(v as i64);
                    nulls.push(false);
                }
                AllTypeVariant::Null => {
                    raw.push(0);
                    nulls.push(true);
                    any_null = true;
                }
                _ => unreachable!("Int32 segment yields Int32 or NULL"),
            }
        }
        let (minima, offsets) = Self::pack_blocks(&raw, &nulls)?;
        Ok(FrameOfReferenceSegment::Int32 {
            block_minima: minima.into_iter().map(|m| m as i32).collect(),
            offsets,
            nulls: any_null.then_some(nulls),
        })
    }

    fn encode_int64(segment: &ValueSegment) -> Result<Self, StorageError> {
        let mut raw: Vec<i64> = Vec::with_capacity(segment.len());
        let mut nulls: Vec<bool> = Vec::with_capacity(segment.len());
        let mut any_null = false;
        for offset in 0..segment.len() as ChunkOffset {
            match segment.get(offset) {
                AllTypeVariant::Int64(v) => {
                    raw.push(v);
                    nulls.push(false);
                }
                AllTypeVariant::Null => {
                    raw.push(0);
                    nulls.push(true);
                    any_null = true;
                }
                _ => unreachable!("Int64 segment yields Int64 or NULL"),
            }
        }
        let (minima, offsets) = Self::pack_blocks(&raw, &nulls)?;
        Ok(FrameOfReferenceSegment::Int64 {
            block_minima: minima,
            offsets,
            nulls: any_null.then_some(nulls),
        })
    }

    /// Compute per-block minima and offsets-from-minimum; NULL slots get
    /// offset 0.
    fn pack_blocks(
        raw: &[i64],
        nulls: &[bool],
    ) -> Result<(Vec<i64>, CompressedVector), StorageError> {
        let mut minima = Vec::with_capacity(raw.len().div_ceil(BLOCK_SIZE));
        let mut offsets: Vec<u32> = Vec::with_capacity(raw.len());

        for (block_index, block) in raw.chunks(BLOCK_SIZE).enumerate() {
            let block_nulls = &nulls[block_index * BLOCK_SIZE..block_index * BLOCK_SIZE + block.len()];
            let minimum = block
                .iter()
                .zip(block_nulls)
                .filter(|(_, &is_null)| !is_null)
                .map(|(&v, _)| v)
                .min()
                .unwrap_or(0);
            minima.push(minimum);
            for (&value, &is_null) in block.iter().zip(block_nulls) {
                if is_null {
                    offsets.push(0);
                } else {
                    let delta = value - minimum;
                    let delta = u32::try_from(delta).map_err(|_| {
                        StorageError::InvalidEncoding(
                            "value range of a block exceeds the 32-bit offset domain".to_string(),
                        )
                    })?;
                    offsets.push(delta);
                }
            }
        }

        Ok((minima, CompressedVector::compress(&offsets, None)))
    }

    pub fn data_type(&self) -> DataType {
        match self {
            FrameOfReferenceSegment::Int32 { .. } => DataType::Int32,
            FrameOfReferenceSegment::Int64 { .. } => DataType::Int64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FrameOfReferenceSegment::Int32 { offsets, .. } => offsets.len(),
            FrameOfReferenceSegment::Int64 { offsets, .. } => offsets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_null_at(&self, offset: ChunkOffset) -> bool {
        let nulls = match self {
            FrameOfReferenceSegment::Int32 { nulls, .. } => nulls,
            FrameOfReferenceSegment::Int64 { nulls, .. } => nulls,
        };
        nulls.as_ref().map_or(false, |nulls| nulls[offset as usize])
    }

    pub fn get(&self, offset: ChunkOffset) -> AllTypeVariant {
        if self.is_null_at(offset) {
            return AllTypeVariant::Null;
        }
        let index = offset as usize;
        match self {
            FrameOfReferenceSegment::Int32 { block_minima, offsets, .. } => {
                let base = block_minima[index / BLOCK_SIZE];
                AllTypeVariant::Int32(base + offsets.get(index) as i32)
            }
            FrameOfReferenceSegment::Int64 { block_minima, offsets, .. } => {
                let base = block_minima[index / BLOCK_SIZE];
                AllTypeVariant::Int64(base + offsets.get(index) as i64)
            }
        }
    }

    pub fn estimate_memory_usage(&self) -> usize {
        match self {
            FrameOfReferenceSegment::Int32 { block_minima, offsets, nulls } => {
                block_minima.capacity() * 4
                    + offsets.estimate_memory_usage()
                    + nulls.as_ref().map_or(0, |n| n.capacity())
            }
            FrameOfReferenceSegment::Int64 { block_minima, offsets, nulls } => {
                block_minima.capacity() * 8
                    + offsets.estimate_memory_usage()
                    + nulls.as_ref().map_or(0, |n| n.capacity())
            }
        }
    }
}
