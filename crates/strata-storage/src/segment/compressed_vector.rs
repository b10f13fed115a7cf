//! Compressed attribute vectors for dictionary-style encodings

use strata_types::ValueId;

use crate::encoding::VectorCompressionType;

/// Number of values packed per bit-packed block.
const BLOCK_SIZE: usize = 128;

/// A compressed vector of small unsigned integers (dictionary value ids or
/// frame-of-reference offsets).
///
/// The fixed-size variants store each entry in 1, 2 or 4 bytes; `SimdBp128`
/// packs blocks of 128 entries at the smallest bit width that fits the
/// block's maximum value.
#[derive(Debug, Clone, PartialEq)]
pub enum CompressedVector {
    FixedSize1B(Vec<u8>),
    FixedSize2B(Vec<u16>),
    FixedSize4B(Vec<u32>),
    SimdBp128(BitPackedVector),
}

impl CompressedVector {
    /// Compress `values` with the requested compression, or with the smallest
    /// fixed-size width that fits `max_value` when `compression` is `None`.
    pub fn compress(values: &[u32], compression: Option<VectorCompressionType>) -> Self {
        let max_value = values.iter().copied().max().unwrap_or(0);
        let compression = compression.unwrap_or(Self::fitted_fixed_size(max_value));
        match compression {
            VectorCompressionType::FixedSize1B => {
                debug_assert!(max_value <= u8::MAX as u32);
                CompressedVector::FixedSize1B(values.iter().map(|&v| v as u8).collect())
            }
            VectorCompressionType::FixedSize2B => {
                debug_assert!(max_value <= u16::MAX as u32);
                CompressedVector::FixedSize2B(values.iter().map(|&v| v as u16).collect())
            }
            VectorCompressionType::FixedSize4B => {
                CompressedVector::FixedSize4B(values.to_vec())
            }
            VectorCompressionType::SimdBp128 => {
                CompressedVector::SimdBp128(BitPackedVector::pack(values))
            }
        }
    }

    fn fitted_fixed_size(max_value: u32) -> VectorCompressionType {
        if max_value <= u8::MAX as u32 {
            VectorCompressionType::FixedSize1B
        } else if max_value <= u16::MAX as u32 {
            VectorCompressionType::FixedSize2B
        } else {
            VectorCompressionType::FixedSize4B
        }
    }

    pub fn compression_type(&self) -> VectorCompressionType {
        match self {
            CompressedVector::FixedSize1B(_) => VectorCompressionType::FixedSize1B,
            CompressedVector::FixedSize2B(_) => VectorCompressionType::FixedSize2B,
            CompressedVector::FixedSize4B(_) => VectorCompressionType::FixedSize4B,
            CompressedVector::SimdBp128(_) => VectorCompressionType::SimdBp128,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CompressedVector::FixedSize1B(data) => data.len(),
            CompressedVector::FixedSize2B(data) => data.len(),
            CompressedVector::FixedSize4B(data) => data.len(),
            CompressedVector::SimdBp128(packed) => packed.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> u32 {
        match self {
            CompressedVector::FixedSize1B(data) => data[index] as u32,
            CompressedVector::FixedSize2B(data) => data[index] as u32,
            CompressedVector::FixedSize4B(data) => data[index],
            CompressedVector::SimdBp128(packed) => packed.get(index),
        }
    }

    pub fn value_id(&self, index: usize) -> ValueId {
        ValueId(self.get(index))
    }

    pub fn estimate_memory_usage(&self) -> usize {
        match self {
            CompressedVector::FixedSize1B(data) => data.capacity(),
            CompressedVector::FixedSize2B(data) => data.capacity() * 2,
            CompressedVector::FixedSize4B(data) => data.capacity() * 4,
            CompressedVector::SimdBp128(packed) => packed.estimate_memory_usage(),
        }
    }
}

/// Bit-packed vector: blocks of 128 values, each block packed at the bit
/// width of its largest value.
#[derive(Debug, Clone, PartialEq)]
pub struct BitPackedVector {
    /// Packed words of all blocks, concatenated.
    words: Vec<u64>,
    /// Per block: (first word index, bit width).
    blocks: Vec<(u32, u8)>,
    len: usize,
}

impl BitPackedVector {
    pub fn pack(values: &[u32]) -> Self {
        let mut words = Vec::new();
        let mut blocks = Vec::with_capacity(values.len().div_ceil(BLOCK_SIZE));

        for block in values.chunks(BLOCK_SIZE) {
            let max_value = block.iter().copied().max().unwrap_or(0);
            let bit_width = (32 - max_value.leading_zeros()).max(1) as u8;
            let first_word = words.len() as u32;
            blocks.push((first_word, bit_width));

            let word_count = (BLOCK_SIZE * bit_width as usize).div_ceil(64);
            words.resize(words.len() + word_count, 0u64);
            for (i, &value) in block.iter().enumerate() {
                let bit_position = i * bit_width as usize;
                let word_index = first_word as usize + bit_position / 64;
                let bit_offset = bit_position % 64;
                words[word_index] |= (value as u64) << bit_offset;
                let bits_in_first = 64 - bit_offset;
                if bits_in_first < bit_width as usize {
                    words[word_index + 1] |= (value as u64) >> bits_in_first;
                }
            }
        }

        BitPackedVector { words, blocks, len: values.len() }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> u32 {
        assert!(index < self.len, "index {} out of bounds ({} values)", index, self.len);
        let (first_word, bit_width) = self.blocks[index / BLOCK_SIZE];
        let bit_width = bit_width as usize;
        let bit_position = (index % BLOCK_SIZE) * bit_width;
        let word_index = first_word as usize + bit_position / 64;
        let bit_offset = bit_position % 64;

        let mut value = self.words[word_index] >> bit_offset;
        let bits_in_first = 64 - bit_offset;
        if bits_in_first < bit_width {
            value |= self.words[word_index + 1] << bits_in_first;
        }
        (value & ((1u64 << bit_width) - 1)) as u32
    }

    pub fn estimate_memory_usage(&self) -> usize {
        self.words.capacity() * 8 + self.blocks.capacity() * std::mem::size_of::<(u32, u8)>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_size_auto_fit() {
        let small = CompressedVector::compress(&[0, 200, 17], None);
        assert_eq!(small.compression_type(), VectorCompressionType::FixedSize1B);
        let medium = CompressedVector::compress(&[0, 300], None);
        assert_eq!(medium.compression_type(), VectorCompressionType::FixedSize2B);
        let large = CompressedVector::compress(&[0, 70_000], None);
        assert_eq!(large.compression_type(), VectorCompressionType::FixedSize4B);
        assert_eq!(large.get(1), 70_000);
    }

    #[test]
    fn test_bit_packed_round_trip() {
        let values: Vec<u32> = (0..1000).map(|i| (i * 7919) % 1023).collect();
        let packed = BitPackedVector::pack(&values);
        assert_eq!(packed.len(), values.len());
        for (i, &expected) in values.iter().enumerate() {
            assert_eq!(packed.get(i), expected, "mismatch at index {}", i);
        }
    }

    #[test]
    fn test_bit_packed_varying_block_widths() {
        // First block fits in 1 bit, second needs 17 bits.
        let mut values = vec![0u32; 128];
        values.extend(std::iter::repeat(100_000).take(128));
        let packed = BitPackedVector::pack(&values);
        assert_eq!(packed.get(0), 0);
        assert_eq!(packed.get(127), 0);
        assert_eq!(packed.get(128), 100_000);
        assert_eq!(packed.get(255), 100_000);
    }

    #[test]
    fn test_bit_packed_partial_block() {
        let values = vec![3, 1, 2];
        let packed = BitPackedVector::pack(&values);
        assert_eq!(packed.len(), 3);
        assert_eq!(packed.get(0), 3);
        assert_eq!(packed.get(2), 2);
    }
}
